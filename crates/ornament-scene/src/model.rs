use {
    crate::{handle::Handle, material::MaterialHandle},
    glam::{Mat4, Vec2, Vec3},
    ornament_core::Aabb,
};

/// A unit sphere placed by an affine transform (scale = radius,
/// translation = center).
#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    pub material: MaterialHandle,
    pub transform: Mat4,
    pub aabb: Aabb,
}

pub type SphereHandle = Handle<Sphere>;

/// The six vertex streams of an indexed triangle mesh. Index triples in
/// `vertex_indices`, `normal_indices` and `uv_indices` address the
/// corresponding attribute arrays independently.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub vertex_indices: Vec<u32>,
    pub normals: Vec<Vec3>,
    pub normal_indices: Vec<u32>,
    pub uvs: Vec<Vec2>,
    pub uv_indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize { self.vertex_indices.len() / 3 }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub data: MeshData,
    pub transform: Mat4,
    pub material: MaterialHandle,
    pub aabb: Aabb,
    pub not_transformed_aabb: Aabb,
}

pub type MeshHandle = Handle<Mesh>;

/// A placement of an existing mesh with its own transform and material.
/// Shares the mesh's BLAS on the device.
#[derive(Clone, Copy, Debug)]
pub struct MeshInstance {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub transform: Mat4,
    pub aabb: Aabb,
}

pub type MeshInstanceHandle = Handle<MeshInstance>;
