//! The memory layout shared with the device kernels. Every struct here is
//! consumed by the GPU byte-for-byte, so layouts are `repr(C)`, padding is
//! explicit and always zeroed, and matrices are transposed into row-major
//! order before upload.

use {
    crate::buffer::RawArray,
    bytemuck::{Pod, Zeroable},
    glam::{Vec2, Vec3},
    ornament_scene::{Camera, Color, Material, State},
};

pub const WORKGROUP_SIZE: u32 = 256;

pub const MODULE_FILE_NAME: &str = "ornament_kernels.co";
pub const PATH_TRACING_KERNEL: &str = "path_tracing_kernel";
pub const POST_PROCESSING_KERNEL: &str = "post_processing_kernel";
pub const CONSTANT_PARAMS_GLOBAL: &str = "constant_params";

pub const INTERNAL_NODE: u32 = 0;
pub const SPHERE_NODE: u32 = 1;
pub const MESH_NODE: u32 = 2;
pub const TRIANGLE_NODE: u32 = 3;

pub const LAMBERTIAN_MATERIAL: u32 = 0;
pub const METAL_MATERIAL: u32 = 1;
pub const DIELECTRIC_MATERIAL: u32 = 2;
pub const DIFFUSE_LIGHT_MATERIAL: u32 = 3;

/// 64-byte BVH node. The tag lives in `node_type`; the other slots are
/// reused per node kind as the field names spell out.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub left_aabb_min_or_v0: [f32; 3],
    /// Internal: left child. Mesh: BLAS root. Triangle: triangle id.
    pub left_or_custom_id: u32,
    pub left_aabb_max_or_v1: [f32; 3],
    /// Internal: right child. Sphere/mesh: material id.
    pub right_or_material_index: u32,
    pub right_aabb_min_or_v2: [f32; 3],
    pub node_type: u32,
    pub right_aabb_max_or_v3: [f32; 3],
    /// Sphere/mesh: index of the shape's transform pair.
    pub transform_id: u32,
}

impl BvhNode {
    pub fn internal(
        left_aabb_min: Vec3,
        left_id: u32,
        left_aabb_max: Vec3,
        right_id: u32,
        right_aabb_min: Vec3,
        right_aabb_max: Vec3,
    ) -> Self {
        Self {
            left_aabb_min_or_v0: left_aabb_min.to_array(),
            left_or_custom_id: left_id,
            left_aabb_max_or_v1: left_aabb_max.to_array(),
            right_or_material_index: right_id,
            right_aabb_min_or_v2: right_aabb_min.to_array(),
            node_type: INTERNAL_NODE,
            right_aabb_max_or_v3: right_aabb_max.to_array(),
            transform_id: 0,
        }
    }

    pub fn sphere(material_id: u32, transform_id: u32) -> Self {
        Self {
            right_or_material_index: material_id,
            node_type: SPHERE_NODE,
            transform_id,
            ..Self::zeroed()
        }
    }

    pub fn mesh(material_id: u32, transform_id: u32, blas_root_id: u32) -> Self {
        Self {
            left_or_custom_id: blas_root_id,
            right_or_material_index: material_id,
            node_type: MESH_NODE,
            transform_id,
            ..Self::zeroed()
        }
    }

    pub fn triangle(v0: Vec3, v1: Vec3, v2: Vec3, triangle_id: u32) -> Self {
        Self {
            left_aabb_min_or_v0: v0.to_array(),
            left_or_custom_id: triangle_id,
            left_aabb_max_or_v1: v1.to_array(),
            right_aabb_min_or_v2: v2.to_array(),
            node_type: TRIANGLE_NODE,
            ..Self::zeroed()
        }
    }
}

/// 32-byte material record; the tag sits at a fixed offset so dispatch on
/// the device stays branchless.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo: [f32; 3],
    pub albedo_texture_index: u32,
    pub fuzz: f32,
    pub ior: f32,
    pub material_type: u32,
    pub _padding: u32,
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            albedo: [1.0, 0.0, 1.0],
            albedo_texture_index: u32::MAX,
            fuzz: 0.0,
            ior: 0.0,
            material_type: LAMBERTIAN_MATERIAL,
            _padding: 0,
        }
    }
}

impl GpuMaterial {
    /// Flattens a scene material. `albedo_texture_id` is the registered
    /// index of the albedo texture when the material samples one.
    pub fn new(material: &Material, albedo_texture_id: Option<u32>) -> Self {
        let mut flat = Self::default();

        if let Some(color) = material.albedo() {
            match color {
                Color::Value(value) => flat.albedo = value.to_array(),
                Color::Texture(_) => {
                    flat.albedo_texture_index =
                        albedo_texture_id.expect("texture referenced before registration");
                }
            }
        }

        match material {
            Material::Lambertian { .. } => flat.material_type = LAMBERTIAN_MATERIAL,
            Material::Metal { fuzz, .. } => {
                flat.material_type = METAL_MATERIAL;
                flat.fuzz = *fuzz;
            }
            Material::Dielectric { ior } => {
                flat.material_type = DIELECTRIC_MATERIAL;
                flat.ior = *ior;
            }
            Material::DiffuseLight { .. } => flat.material_type = DIFFUSE_LIGHT_MATERIAL,
        }

        flat
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuCamera {
    pub origin: [f32; 3],
    pub lens_radius: f32,
    pub lower_left_corner: [f32; 3],
    pub _padding0: u32,
    pub horizontal: [f32; 3],
    pub _padding1: u32,
    pub vertical: [f32; 3],
    pub _padding2: u32,
    pub u: [f32; 3],
    pub _padding3: u32,
    pub v: [f32; 3],
    pub _padding4: u32,
    pub w: [f32; 3],
    pub _padding5: u32,
}

impl GpuCamera {
    pub fn new(camera: &Camera) -> Self {
        Self {
            origin: camera.look_from().to_array(),
            lens_radius: camera.lens_radius(),
            lower_left_corner: camera.lower_left_corner().to_array(),
            horizontal: camera.horizontal().to_array(),
            vertical: camera.vertical().to_array(),
            u: camera.u().to_array(),
            v: camera.v().to_array(),
            w: camera.w().to_array(),
            ..Self::zeroed()
        }
    }
}

/// Module-global constants block, re-uploaded before every iteration.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ConstantParams {
    pub camera: GpuCamera,
    pub depth: u32,
    pub width: u32,
    pub height: u32,
    pub flip_y: u32,
    pub inverted_gamma: f32,
    pub ray_cast_epsilon: f32,
    pub textures_count: u32,
    pub current_iteration: f32,
}

impl ConstantParams {
    pub fn new(camera: &Camera, state: &State, textures_count: u32) -> Self {
        Self {
            camera: GpuCamera::new(camera),
            depth: state.depth(),
            width: state.resolution().x,
            height: state.resolution().y,
            flip_y: state.flip_y() as u32,
            inverted_gamma: state.inverted_gamma(),
            ray_cast_epsilon: state.ray_cast_epsilon(),
            textures_count,
            current_iteration: state.current_iteration(),
        }
    }
}

/// The single argument struct both kernels receive.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct KernelArgs {
    pub tlas_nodes: RawArray,
    pub blas_nodes: RawArray,
    pub normals: RawArray,
    pub normal_indices: RawArray,
    pub uvs: RawArray,
    pub uv_indices: RawArray,
    pub transforms: RawArray,
    pub materials: RawArray,
    pub textures: RawArray,
    pub framebuffer: RawArray,
    pub accumulation_buffer: RawArray,
    pub rng_seed_buffer: RawArray,
    pub pixel_count: u32,
    pub _padding: u32,
}

/// Normals upload as vec4 with a zeroed w component.
pub fn pack_normal(n: Vec3) -> glam::Vec4 { n.extend(0.0) }

/// UVs upload as-is.
pub type Uv = Vec2;

#[cfg(test)]
mod tests {
    use {
        super::*,
        glam::vec3,
        ornament_scene::{CameraConfig, TextureHandle},
        std::mem::size_of,
    };

    #[test]
    fn contract_sizes_are_fixed() {
        assert_eq!(size_of::<BvhNode>(), 64);
        assert_eq!(size_of::<GpuMaterial>(), 32);
        assert_eq!(size_of::<GpuCamera>(), 112);
        assert_eq!(size_of::<ConstantParams>(), 144);
        assert_eq!(size_of::<RawArray>(), 16);
        assert_eq!(size_of::<KernelArgs>(), 12 * 16 + 8);
    }

    #[test]
    fn node_tag_offset_is_stable() {
        let node = BvhNode::sphere(7, 3);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&node));
        assert_eq!(words[11], SPHERE_NODE);
        assert_eq!(words[7], 7);
        assert_eq!(words[15], 3);
    }

    #[test]
    fn triangle_node_keeps_vertices() {
        let node = BvhNode::triangle(Vec3::X, Vec3::Y, Vec3::Z, 42);
        assert_eq!(node.left_aabb_min_or_v0, [1.0, 0.0, 0.0]);
        assert_eq!(node.left_aabb_max_or_v1, [0.0, 1.0, 0.0]);
        assert_eq!(node.right_aabb_min_or_v2, [0.0, 0.0, 1.0]);
        assert_eq!(node.left_or_custom_id, 42);
        assert_eq!(node.node_type, TRIANGLE_NODE);
    }

    #[test]
    fn material_flattening() {
        let flat = GpuMaterial::new(
            &Material::Metal {
                albedo: Color::Value(vec3(0.8, 0.6, 0.2)),
                fuzz: 0.3,
            },
            None,
        );
        assert_eq!(flat.material_type, METAL_MATERIAL);
        assert_eq!(flat.albedo, [0.8, 0.6, 0.2]);
        assert_eq!(flat.fuzz, 0.3);
        assert_eq!(flat.albedo_texture_index, u32::MAX);

        let handle = TextureHandle::new();
        let flat = GpuMaterial::new(
            &Material::Lambertian {
                albedo: Color::Texture(handle),
            },
            Some(5),
        );
        assert_eq!(flat.albedo_texture_index, 5);

        let flat = GpuMaterial::new(&Material::Dielectric { ior: 1.5 }, None);
        assert_eq!(flat.material_type, DIELECTRIC_MATERIAL);
        assert_eq!(flat.ior, 1.5);
    }

    #[test]
    fn constant_params_mirror_state() {
        let camera = Camera::new(CameraConfig::default());
        let mut state = State::default();
        state.set_gamma(2.0);
        state.set_flip_y(true);
        state.next_iteration();

        let params = ConstantParams::new(&camera, &state, 3);
        assert_eq!(params.width, 500);
        assert_eq!(params.height, 500);
        assert_eq!(params.flip_y, 1);
        assert_eq!(params.inverted_gamma, 0.5);
        assert_eq!(params.textures_count, 3);
        assert_eq!(params.current_iteration, 1.0);
    }
}
