pub mod camera;
pub mod handle;
pub mod material;
pub mod model;
pub mod primitives;
pub mod scene;
pub mod state;

pub use {
    camera::{Camera, CameraConfig},
    handle::Handle,
    material::{Color, Material, MaterialHandle, Texture, TextureHandle},
    model::{Mesh, MeshData, MeshHandle, MeshInstance, MeshInstanceHandle, Sphere, SphereHandle},
    scene::Scene,
    state::State,
};
