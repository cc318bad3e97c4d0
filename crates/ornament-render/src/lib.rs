pub mod path_tracer;

pub use path_tracer::PathTracer;
