pub use ornament_bvh;
pub use ornament_core;
pub use ornament_gpu;
pub use ornament_render;
pub use ornament_scene;

pub mod prelude {
    pub use {
        ornament_bvh::Bvh,
        ornament_gpu::{Device, SoftwareDevice},
        ornament_render::PathTracer,
        ornament_scene::{Camera, CameraConfig, Color, MeshData, Scene, State},
    };
}
