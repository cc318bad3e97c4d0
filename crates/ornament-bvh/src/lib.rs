pub mod builder;
pub mod error;

pub use {builder::Bvh, error::BuildError};
