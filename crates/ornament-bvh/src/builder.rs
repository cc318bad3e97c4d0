//! The scene compiler: flattens an attached scene into the device arrays
//! the kernels traverse. Builds one TLAS over all attached shapes and,
//! lazily, one BLAS per unique mesh; both levels use a median split over a
//! randomly chosen axis. Children are pushed before their parent, so the
//! root of each (sub)tree is the highest index and the TLAS entry point is
//! the last node overall.

use {
    crate::error::BuildError,
    anyhow::Result,
    glam::{Mat4, Vec2, Vec3, Vec4},
    ornament_core::Aabb,
    ornament_gpu::kernel::{pack_normal, BvhNode, GpuMaterial},
    ornament_scene::{Color, MaterialHandle, MeshHandle, Scene, TextureHandle},
    rand::{rngs::SmallRng, Rng, SeedableRng},
    std::collections::{HashMap, HashSet},
};

#[derive(Clone, Copy)]
enum LeafKind {
    Sphere,
    Mesh(MeshHandle),
}

#[derive(Clone, Copy)]
struct Leaf {
    aabb: Aabb,
    transform: Mat4,
    material: MaterialHandle,
    kind: LeafKind,
}

#[derive(Clone, Copy)]
struct TriangleLeaf {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    triangle_index: u32,
    aabb: Aabb,
}

/// The flattened scene: six device arrays plus the registration maps that
/// record the stable id every material, texture and mesh BLAS was given.
#[derive(Debug, Default)]
pub struct Bvh {
    tlas_nodes: Vec<BvhNode>,
    blas_nodes: Vec<BvhNode>,
    normals: Vec<Vec4>,
    normal_indices: Vec<u32>,
    uvs: Vec<Vec2>,
    uv_indices: Vec<u32>,
    transforms: Vec<Mat4>,
    materials: Vec<GpuMaterial>,
    textures: Vec<TextureHandle>,
    material_ids: HashMap<MaterialHandle, u32>,
    texture_ids: HashMap<TextureHandle, u32>,
    blas_roots: HashMap<MeshHandle, u32>,
}

impl Bvh {
    pub fn build(scene: &Scene) -> Result<Self> {
        Self::build_with_rng(scene, SmallRng::from_entropy())
    }

    /// Axis selection is random; seeding makes tree shapes reproducible.
    pub fn build_seeded(scene: &Scene, seed: u64) -> Result<Self> {
        Self::build_with_rng(scene, SmallRng::seed_from_u64(seed))
    }

    fn build_with_rng(scene: &Scene, rng: SmallRng) -> Result<Self> {
        Builder {
            scene,
            rng,
            bvh: Bvh::default(),
        }
        .build()
    }

    pub fn tlas_nodes(&self) -> &[BvhNode] { &self.tlas_nodes }

    pub fn blas_nodes(&self) -> &[BvhNode] { &self.blas_nodes }

    pub fn normals(&self) -> &[Vec4] { &self.normals }

    pub fn normal_indices(&self) -> &[u32] { &self.normal_indices }

    pub fn uvs(&self) -> &[Vec2] { &self.uvs }

    pub fn uv_indices(&self) -> &[u32] { &self.uv_indices }

    /// Paired per shape: entry `2k` is the transposed inverse transform,
    /// entry `2k + 1` the transposed forward transform.
    pub fn transforms(&self) -> &[Mat4] { &self.transforms }

    pub fn materials(&self) -> &[GpuMaterial] { &self.materials }

    /// Registered textures in texture-id order.
    pub fn textures(&self) -> &[TextureHandle] { &self.textures }

    pub fn material_id(&self, handle: MaterialHandle) -> Option<u32> {
        self.material_ids.get(&handle).copied()
    }

    pub fn texture_id(&self, handle: TextureHandle) -> Option<u32> {
        self.texture_ids.get(&handle).copied()
    }

    pub fn blas_root(&self, handle: MeshHandle) -> Option<u32> {
        self.blas_roots.get(&handle).copied()
    }
}

struct Builder<'a> {
    scene: &'a Scene,
    rng: SmallRng,
    bvh: Bvh,
}

fn bounding_box_of<'i>(aabbs: impl Iterator<Item = &'i Aabb>) -> Aabb {
    let mut result = Aabb::default();
    for aabb in aabbs {
        result.merge(aabb);
    }
    result
}

impl Builder<'_> {
    fn build(mut self) -> Result<Bvh> {
        let scene = self.scene;
        let shapes_count = scene.attached_spheres().len()
            + scene.attached_meshes().len()
            + scene.attached_mesh_instances().len();
        if shapes_count == 0 {
            return Err(BuildError::EmptyScene.into());
        }

        let expected_tlas_nodes = shapes_count * 2 - 1;
        let expected_blas_nodes = self.expected_blas_nodes();

        let mut leaves = Vec::with_capacity(shapes_count);

        for &handle in scene.attached_spheres() {
            let sphere = scene
                .get_sphere(handle)
                .unwrap_or_else(|| panic!("unknown sphere {handle:?}"));
            leaves.push(Leaf {
                aabb: sphere.aabb,
                transform: sphere.transform,
                material: sphere.material,
                kind: LeafKind::Sphere,
            });
        }

        for &handle in scene.attached_mesh_instances() {
            let instance = scene
                .get_mesh_instance(handle)
                .unwrap_or_else(|| panic!("unknown mesh instance {handle:?}"));
            leaves.push(Leaf {
                aabb: instance.aabb,
                transform: instance.transform,
                material: instance.material,
                kind: LeafKind::Mesh(instance.mesh),
            });
            if !self.bvh.blas_roots.contains_key(&instance.mesh) {
                self.build_mesh_blas(instance.mesh)?;
            }
        }

        for &handle in scene.attached_meshes() {
            let mesh = scene
                .get_mesh(handle)
                .unwrap_or_else(|| panic!("unknown mesh {handle:?}"));
            leaves.push(Leaf {
                aabb: mesh.aabb,
                transform: mesh.transform,
                material: mesh.material,
                kind: LeafKind::Mesh(handle),
            });
            if !self.bvh.blas_roots.contains_key(&handle) {
                self.build_mesh_blas(handle)?;
            }
        }

        let root = self.build_tlas_recursive(&mut leaves);
        self.bvh.tlas_nodes.push(root);

        if self.bvh.tlas_nodes.len() != expected_tlas_nodes {
            return Err(BuildError::NodeCountMismatch {
                kind: "TLAS",
                expected: expected_tlas_nodes,
                actual: self.bvh.tlas_nodes.len(),
            }
            .into());
        }
        if self.bvh.blas_nodes.len() != expected_blas_nodes {
            return Err(BuildError::NodeCountMismatch {
                kind: "BLAS",
                expected: expected_blas_nodes,
                actual: self.bvh.blas_nodes.len(),
            }
            .into());
        }

        log::debug!(
            "Compiled scene: {} TLAS nodes, {} BLAS nodes, {} materials, {} textures",
            self.bvh.tlas_nodes.len(),
            self.bvh.blas_nodes.len(),
            self.bvh.materials.len(),
            self.bvh.textures.len(),
        );

        Ok(self.bvh)
    }

    /// `2T - 1` nodes per unique mesh, whether it is attached directly or
    /// reached through instances.
    fn expected_blas_nodes(&self) -> usize {
        let scene = self.scene;
        let mut unique = HashSet::new();
        unique.extend(scene.attached_meshes().iter().copied());
        unique.extend(
            scene
                .attached_mesh_instances()
                .iter()
                .filter_map(|&handle| scene.get_mesh_instance(handle))
                .map(|instance| instance.mesh),
        );

        unique
            .into_iter()
            .filter_map(|handle| scene.get_mesh(handle))
            .map(|mesh| mesh.data.triangle_count() * 2 - 1)
            .sum()
    }

    fn build_mesh_blas(&mut self, handle: MeshHandle) -> Result<()> {
        let scene = self.scene;
        let mesh = scene
            .get_mesh(handle)
            .unwrap_or_else(|| panic!("unknown mesh {handle:?}"));

        let triangle_count = mesh.data.triangle_count();
        if triangle_count == 0 {
            return Err(BuildError::EmptyMesh.into());
        }

        let mut leaves = Vec::with_capacity(triangle_count);
        for triangle in 0..triangle_count {
            let v0 = mesh.data.vertices[mesh.data.vertex_indices[triangle * 3] as usize];
            let v1 = mesh.data.vertices[mesh.data.vertex_indices[triangle * 3 + 1] as usize];
            let v2 = mesh.data.vertices[mesh.data.vertex_indices[triangle * 3 + 2] as usize];

            // Triangles index the concatenated attribute streams, so the id
            // keeps counting across meshes.
            let global_triangle_index = self.bvh.normal_indices.len() / 3 + triangle;
            leaves.push(TriangleLeaf {
                v0,
                v1,
                v2,
                triangle_index: global_triangle_index as u32,
                aabb: Aabb::new(v0.min(v1).min(v2), v0.max(v1).max(v2)),
            });
        }

        let normal_base = self.bvh.normals.len() as u32;
        for &index in &mesh.data.normal_indices {
            self.bvh.normal_indices.push(index + normal_base);
        }
        for &normal in &mesh.data.normals {
            self.bvh.normals.push(pack_normal(normal));
        }

        let uv_base = self.bvh.uvs.len() as u32;
        for &index in &mesh.data.uv_indices {
            self.bvh.uv_indices.push(index + uv_base);
        }
        self.bvh.uvs.extend_from_slice(&mesh.data.uvs);

        let root = self.build_blas_recursive(&mut leaves);
        self.bvh.blas_nodes.push(root);
        self.bvh
            .blas_roots
            .insert(handle, self.bvh.blas_nodes.len() as u32 - 1);
        Ok(())
    }

    fn build_blas_recursive(&mut self, leaves: &mut [TriangleLeaf]) -> BvhNode {
        if leaves.len() == 1 {
            let triangle = leaves[0];
            return BvhNode::triangle(
                triangle.v0,
                triangle.v1,
                triangle.v2,
                triangle.triangle_index,
            );
        }

        let axis = self.rng.gen_range(0..3usize);
        leaves.sort_by(|a, b| a.aabb.min()[axis].total_cmp(&b.aabb.min()[axis]));

        let mid = leaves.len() / 2;
        let (left_half, right_half) = leaves.split_at_mut(mid);

        let left = self.build_blas_recursive(left_half);
        let left_aabb = bounding_box_of(left_half.iter().map(|leaf| &leaf.aabb));
        self.bvh.blas_nodes.push(left);
        let left_id = self.bvh.blas_nodes.len() as u32 - 1;

        let right = self.build_blas_recursive(right_half);
        let right_aabb = bounding_box_of(right_half.iter().map(|leaf| &leaf.aabb));
        self.bvh.blas_nodes.push(right);
        let right_id = self.bvh.blas_nodes.len() as u32 - 1;

        BvhNode::internal(
            left_aabb.min(),
            left_id,
            left_aabb.max(),
            right_id,
            right_aabb.min(),
            right_aabb.max(),
        )
    }

    fn build_tlas_recursive(&mut self, leaves: &mut [Leaf]) -> BvhNode {
        if leaves.len() == 1 {
            let leaf = leaves[0];
            self.append_transform_pair(&leaf.transform);
            let transform_id = (self.bvh.transforms.len() / 2 - 1) as u32;
            let material_id = self.register_material(leaf.material);

            return match leaf.kind {
                LeafKind::Sphere => BvhNode::sphere(material_id, transform_id),
                LeafKind::Mesh(mesh) => {
                    BvhNode::mesh(material_id, transform_id, self.bvh.blas_roots[&mesh])
                }
            };
        }

        let axis = self.rng.gen_range(0..3usize);
        leaves.sort_by(|a, b| a.aabb.min()[axis].total_cmp(&b.aabb.min()[axis]));

        let mid = leaves.len() / 2;
        let (left_half, right_half) = leaves.split_at_mut(mid);

        let left = self.build_tlas_recursive(left_half);
        let left_aabb = bounding_box_of(left_half.iter().map(|leaf| &leaf.aabb));
        self.bvh.tlas_nodes.push(left);
        let left_id = self.bvh.tlas_nodes.len() as u32 - 1;

        let right = self.build_tlas_recursive(right_half);
        let right_aabb = bounding_box_of(right_half.iter().map(|leaf| &leaf.aabb));
        self.bvh.tlas_nodes.push(right);
        let right_id = self.bvh.tlas_nodes.len() as u32 - 1;

        BvhNode::internal(
            left_aabb.min(),
            left_id,
            left_aabb.max(),
            right_id,
            right_aabb.min(),
            right_aabb.max(),
        )
    }

    /// Row-major device convention: matrices are transposed on insertion.
    fn append_transform_pair(&mut self, transform: &Mat4) {
        self.bvh.transforms.push(transform.inverse().transpose());
        self.bvh.transforms.push(transform.transpose());
    }

    fn register_material(&mut self, handle: MaterialHandle) -> u32 {
        if let Some(&id) = self.bvh.material_ids.get(&handle) {
            return id;
        }

        let material = self
            .scene
            .get_material(handle)
            .unwrap_or_else(|| panic!("unknown material {handle:?}"));

        let mut albedo_texture_id = None;
        if let Some(Color::Texture(texture)) = material.albedo() {
            let id = match self.bvh.texture_ids.get(&texture) {
                Some(&id) => id,
                None => {
                    self.bvh.textures.push(texture);
                    let id = self.bvh.textures.len() as u32 - 1;
                    self.bvh.texture_ids.insert(texture, id);
                    id
                }
            };
            albedo_texture_id = Some(id);
        }

        self.bvh.materials.push(GpuMaterial::new(material, albedo_texture_id));
        let id = self.bvh.materials.len() as u32 - 1;
        self.bvh.material_ids.insert(handle, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        glam::{vec3, Mat4},
        ornament_gpu::kernel::{INTERNAL_NODE, MESH_NODE, SPHERE_NODE, TRIANGLE_NODE},
        ornament_scene::{Camera, CameraConfig, MeshData},
    };

    fn test_scene() -> Scene { Scene::new(Camera::new(CameraConfig::default())) }

    fn triangle_data() -> MeshData {
        MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_indices: vec![0, 1, 2],
            normals: vec![Vec3::Z; 3],
            normal_indices: vec![0, 1, 2],
            uvs: Vec::new(),
            uv_indices: Vec::new(),
        }
    }

    fn triangles_data(count: usize) -> MeshData {
        MeshData {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vertex_indices: (0..count).flat_map(|_| [0, 1, 2]).collect(),
            normals: vec![Vec3::Z; 3],
            normal_indices: (0..count).flat_map(|_| [0, 1, 2]).collect(),
            uvs: Vec::new(),
            uv_indices: Vec::new(),
        }
    }

    #[test]
    fn empty_scene_is_rejected() {
        let scene = test_scene();
        let err = Bvh::build(&scene).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::EmptyScene)
        ));
    }

    #[test]
    fn zero_triangle_mesh_is_rejected() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));
        let mesh = scene.mesh(MeshData::default(), Mat4::IDENTITY, material);
        scene.attach_mesh(mesh);

        let err = Bvh::build(&scene).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::EmptyMesh)
        ));
    }

    #[test]
    fn node_counts_match_shape_and_triangle_counts() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));

        let s1 = scene.sphere(Vec3::ZERO, 1.0, material);
        let s2 = scene.sphere(vec3(3.0, 0.0, 0.0), 1.0, material);
        let mesh = scene.mesh(triangles_data(12), Mat4::IDENTITY, material);
        let i1 = scene.mesh_instance(mesh, Mat4::from_translation(vec3(0.0, 2.0, 0.0)), material);
        let i2 = scene.mesh_instance(mesh, Mat4::from_translation(vec3(0.0, 4.0, 0.0)), material);
        let i3 = scene.mesh_instance(mesh, Mat4::from_translation(vec3(0.0, 6.0, 0.0)), material);

        scene.attach_sphere(s1);
        scene.attach_sphere(s2);
        scene.attach_mesh(mesh);
        scene.attach_mesh_instance(i1);
        scene.attach_mesh_instance(i2);
        scene.attach_mesh_instance(i3);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.tlas_nodes().len(), 2 * 6 - 1);
        assert_eq!(bvh.blas_nodes().len(), 2 * 12 - 1);
    }

    #[test]
    fn single_sphere_flattening() {
        let mut scene = test_scene();
        let material = scene.metal(vec3(0.9, 0.9, 0.9), 0.1);
        let sphere = scene.sphere(vec3(1.0, 2.0, 3.0), 2.0, material);
        scene.attach_sphere(sphere);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.tlas_nodes().len(), 1);
        assert_eq!(bvh.blas_nodes().len(), 0);

        let node = &bvh.tlas_nodes()[0];
        assert_eq!(node.node_type, SPHERE_NODE);
        assert_eq!(node.right_or_material_index, 0);
        assert_eq!(node.transform_id, 0);

        // Paired transforms: transposed inverse first, transposed forward second.
        let transform = scene.get_sphere(sphere).unwrap().transform;
        assert_eq!(bvh.transforms().len(), 2);
        assert_eq!(bvh.transforms()[0], transform.inverse().transpose());
        assert_eq!(bvh.transforms()[1], transform.transpose());

        assert_eq!(bvh.material_id(material), Some(0));
        assert_eq!(bvh.materials()[0], GpuMaterial::new(
            scene.get_material(material).unwrap(),
            None,
        ));
    }

    #[test]
    fn shared_materials_register_once() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.2, 0.4, 0.8));
        let s1 = scene.sphere(Vec3::ZERO, 1.0, material);
        let s2 = scene.sphere(vec3(5.0, 0.0, 0.0), 1.0, material);
        scene.attach_sphere(s1);
        scene.attach_sphere(s2);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.materials().len(), 1);
        for node in bvh.tlas_nodes() {
            if node.node_type == SPHERE_NODE {
                assert_eq!(node.right_or_material_index, 0);
            }
        }
    }

    #[test]
    fn shared_textures_register_once() {
        let mut scene = test_scene();
        let texture = scene.texture(vec![255, 0, 0, 255], 1, 1, 4, 1, false, 1.0);
        let lambertian = scene.lambertian(texture);
        let metal = scene.metal(texture, 0.2);
        let s1 = scene.sphere(Vec3::ZERO, 1.0, lambertian);
        let s2 = scene.sphere(vec3(5.0, 0.0, 0.0), 1.0, metal);
        scene.attach_sphere(s1);
        scene.attach_sphere(s2);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.textures(), &[texture]);
        assert_eq!(bvh.texture_id(texture), Some(0));
        assert_eq!(bvh.materials().len(), 2);
        for material in bvh.materials() {
            assert_eq!(material.albedo_texture_index, 0);
        }
    }

    #[test]
    fn triangle_ids_continue_across_meshes() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));
        let first = scene.mesh(triangle_data(), Mat4::IDENTITY, material);
        let second = scene.mesh(
            triangle_data(),
            Mat4::from_translation(vec3(4.0, 0.0, 0.0)),
            material,
        );
        scene.attach_mesh(first);
        scene.attach_mesh(second);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.blas_nodes().len(), 2);

        let triangles = bvh
            .blas_nodes()
            .iter()
            .filter(|node| node.node_type == TRIANGLE_NODE)
            .map(|node| node.left_or_custom_id)
            .collect::<Vec<_>>();
        assert_eq!(triangles, vec![0, 1]);

        // Indices are rebased onto the concatenated attribute arrays.
        assert_eq!(bvh.normal_indices(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(bvh.normals().len(), 6);
        assert_eq!(bvh.uv_indices(), &[0, 1, 2, 3, 4, 5]);

        assert_eq!(bvh.blas_root(first), Some(0));
        assert_eq!(bvh.blas_root(second), Some(1));
    }

    #[test]
    fn instances_share_their_mesh_blas() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));
        let other = scene.metal(vec3(0.8, 0.8, 0.8), 0.0);
        let mesh = scene.mesh(triangle_data(), Mat4::IDENTITY, material);
        let instance =
            scene.mesh_instance(mesh, Mat4::from_translation(vec3(0.0, 2.0, 0.0)), other);

        // Only the instance is attached; the mesh BLAS is still built once.
        scene.attach_mesh_instance(instance);

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.tlas_nodes().len(), 1);
        assert_eq!(bvh.blas_nodes().len(), 1);

        let node = &bvh.tlas_nodes()[0];
        assert_eq!(node.node_type, MESH_NODE);
        assert_eq!(node.left_or_custom_id, 0);
        assert_eq!(node.right_or_material_index, bvh.material_id(other).unwrap());
    }

    #[test]
    fn tlas_root_is_pushed_last() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));
        for x in 0..3 {
            let sphere = scene.sphere(vec3(x as f32 * 3.0, 0.0, 0.0), 1.0, material);
            scene.attach_sphere(sphere);
        }

        let bvh = Bvh::build(&scene).unwrap();
        assert_eq!(bvh.tlas_nodes().len(), 5);
        assert_eq!(bvh.tlas_nodes().last().unwrap().node_type, INTERNAL_NODE);
    }

    #[test]
    fn seeded_builds_are_reproducible() {
        let mut scene = test_scene();
        let material = scene.lambertian(vec3(0.5, 0.5, 0.5));
        for x in 0..5 {
            let sphere = scene.sphere(vec3(x as f32 * 3.0, x as f32, 0.0), 1.0, material);
            scene.attach_sphere(sphere);
        }

        let a = Bvh::build_seeded(&scene, 7).unwrap();
        let b = Bvh::build_seeded(&scene, 7).unwrap();
        assert_eq!(a.tlas_nodes(), b.tlas_nodes());
    }
}
