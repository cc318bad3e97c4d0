pub mod aabb;
pub mod logging;
pub mod math;

pub use {aabb::Aabb, logging::setup_logger};
