use {
    crate::{
        camera::Camera,
        material::{Color, Material, MaterialHandle, Texture, TextureHandle},
        model::{
            Mesh, MeshData, MeshHandle, MeshInstance, MeshInstanceHandle, Sphere, SphereHandle,
        },
        primitives,
        state::State,
    },
    glam::{vec2, Mat4, Vec3},
    ornament_core::{math, Aabb},
    std::collections::HashMap,
};

/// Owns every entity created through its constructors. Entities referenced
/// by handle stay alive for the scene's lifetime; only *attached* shapes
/// are compiled into the acceleration structure.
#[derive(Debug)]
pub struct Scene {
    camera: Camera,
    state: State,
    textures: HashMap<TextureHandle, Texture>,
    materials: HashMap<MaterialHandle, Material>,
    spheres: HashMap<SphereHandle, Sphere>,
    meshes: HashMap<MeshHandle, Mesh>,
    mesh_instances: HashMap<MeshInstanceHandle, MeshInstance>,
    attached_spheres: Vec<SphereHandle>,
    attached_meshes: Vec<MeshHandle>,
    attached_mesh_instances: Vec<MeshInstanceHandle>,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            state: State::default(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            spheres: HashMap::new(),
            meshes: HashMap::new(),
            mesh_instances: HashMap::new(),
            attached_spheres: Vec::new(),
            attached_meshes: Vec::new(),
            attached_mesh_instances: Vec::new(),
        }
    }

    pub fn lambertian(&mut self, albedo: impl Into<Color>) -> MaterialHandle {
        self.add_material(Material::Lambertian {
            albedo: albedo.into(),
        })
    }

    pub fn metal(&mut self, albedo: impl Into<Color>, fuzz: f32) -> MaterialHandle {
        self.add_material(Material::Metal {
            albedo: albedo.into(),
            fuzz,
        })
    }

    pub fn dielectric(&mut self, ior: f32) -> MaterialHandle {
        self.add_material(Material::Dielectric { ior })
    }

    pub fn diffuse_light(&mut self, albedo: impl Into<Color>) -> MaterialHandle {
        self.add_material(Material::DiffuseLight {
            albedo: albedo.into(),
        })
    }

    fn add_material(&mut self, material: Material) -> MaterialHandle {
        let handle = MaterialHandle::new();
        self.materials.insert(handle, material);
        handle
    }

    pub fn texture(
        &mut self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        num_components: u32,
        bytes_per_component: u32,
        is_hdr: bool,
        gamma: f32,
    ) -> TextureHandle {
        let handle = TextureHandle::new();
        self.textures.insert(
            handle,
            Texture {
                data,
                width,
                height,
                num_components,
                bytes_per_component,
                bytes_per_row: width * num_components * bytes_per_component,
                is_hdr,
                gamma,
            },
        );
        handle
    }

    pub fn sphere(&mut self, center: Vec3, radius: f32, material: MaterialHandle) -> SphereHandle {
        let handle = SphereHandle::new();
        self.spheres.insert(
            handle,
            Sphere {
                material,
                transform: Mat4::from_translation(center)
                    * Mat4::from_scale(Vec3::splat(radius)),
                aabb: Aabb::new(center - Vec3::splat(radius), center + Vec3::splat(radius)),
            },
        );
        handle
    }

    /// Indices must address valid attribute entries, with one normal and uv
    /// index per vertex index; violations are the caller's bug. An empty
    /// `uvs` stream is replaced by a constant (0.5, 0.5) per vertex.
    pub fn mesh(
        &mut self,
        mut data: MeshData,
        transform: Mat4,
        material: MaterialHandle,
    ) -> MeshHandle {
        debug_assert_eq!(data.vertex_indices.len() % 3, 0);
        debug_assert_eq!(data.vertex_indices.len(), data.normal_indices.len());
        debug_assert!(data
            .vertex_indices
            .iter()
            .all(|&i| (i as usize) < data.vertices.len()));

        let mut not_transformed_aabb = Aabb::default();
        for &index in &data.vertex_indices {
            not_transformed_aabb.grow(data.vertices[index as usize]);
        }
        let aabb = Aabb::transform(&transform, &not_transformed_aabb);

        if data.uvs.is_empty() {
            data.uvs = vec![vec2(0.5, 0.5); data.vertices.len()];
            data.uv_indices = data.vertex_indices.clone();
        }
        debug_assert_eq!(data.vertex_indices.len(), data.uv_indices.len());

        let handle = MeshHandle::new();
        self.meshes.insert(
            handle,
            Mesh {
                data,
                transform,
                material,
                aabb,
                not_transformed_aabb,
            },
        );
        handle
    }

    pub fn sphere_mesh(
        &mut self,
        center: Vec3,
        radius: f32,
        material: MaterialHandle,
    ) -> MeshHandle {
        let transform =
            Mat4::from_translation(center) * Mat4::from_scale(Vec3::splat(radius));
        self.mesh(primitives::uv_sphere(), transform, material)
    }

    pub fn plane_mesh(
        &mut self,
        center: Vec3,
        side1_length: f32,
        side2_length: f32,
        normal: Vec3,
        material: MaterialHandle,
    ) -> MeshHandle {
        let rotation = math::rotation_between_vectors(normal, Vec3::Y);
        let transform = Mat4::from_translation(center)
            * rotation
            * Mat4::from_scale(Vec3::new(side1_length, 1.0, side2_length));
        self.mesh(primitives::unit_quad(), transform, material)
    }

    pub fn mesh_instance(
        &mut self,
        mesh: MeshHandle,
        transform: Mat4,
        material: MaterialHandle,
    ) -> MeshInstanceHandle {
        let local_aabb = self
            .meshes
            .get(&mesh)
            .unwrap_or_else(|| panic!("unknown mesh {mesh:?}"))
            .not_transformed_aabb;

        let handle = MeshInstanceHandle::new();
        self.mesh_instances.insert(
            handle,
            MeshInstance {
                mesh,
                material,
                transform,
                aabb: Aabb::transform(&transform, &local_aabb),
            },
        );
        handle
    }

    pub fn attach_sphere(&mut self, sphere: SphereHandle) {
        debug_assert!(self.spheres.contains_key(&sphere));
        self.attached_spheres.push(sphere);
    }

    pub fn attach_mesh(&mut self, mesh: MeshHandle) {
        debug_assert!(self.meshes.contains_key(&mesh));
        self.attached_meshes.push(mesh);
    }

    pub fn attach_mesh_instance(&mut self, mesh_instance: MeshInstanceHandle) {
        debug_assert!(self.mesh_instances.contains_key(&mesh_instance));
        self.attached_mesh_instances.push(mesh_instance);
    }

    pub fn camera(&self) -> &Camera { &self.camera }

    pub fn camera_mut(&mut self) -> &mut Camera { &mut self.camera }

    pub fn state(&self) -> &State { &self.state }

    pub fn state_mut(&mut self) -> &mut State { &mut self.state }

    pub fn get_texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(&handle)
    }

    pub fn get_material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(&handle)
    }

    pub fn get_sphere(&self, handle: SphereHandle) -> Option<&Sphere> {
        self.spheres.get(&handle)
    }

    pub fn get_mesh(&self, handle: MeshHandle) -> Option<&Mesh> { self.meshes.get(&handle) }

    pub fn get_mesh_instance(&self, handle: MeshInstanceHandle) -> Option<&MeshInstance> {
        self.mesh_instances.get(&handle)
    }

    pub fn attached_spheres(&self) -> &[SphereHandle] { &self.attached_spheres }

    pub fn attached_meshes(&self) -> &[MeshHandle] { &self.attached_meshes }

    pub fn attached_mesh_instances(&self) -> &[MeshInstanceHandle] {
        &self.attached_mesh_instances
    }
}
