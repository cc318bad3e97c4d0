//! CPU interpretation of the device kernels. Mirrors the data contract in
//! [`crate::kernel`]: one logical thread per pixel, per-pixel PCG state,
//! two-level BVH traversal with a sentinel to restore the untransformed ray
//! when a BLAS is exhausted.

use {
    super::{rng::RndGen, SoftwareState},
    crate::{
        buffer::RawArray,
        device::TextureFormat,
        error::DeviceError,
        kernel::{
            BvhNode, ConstantParams, GpuCamera, GpuMaterial, KernelArgs,
            DIELECTRIC_MATERIAL, DIFFUSE_LIGHT_MATERIAL, INTERNAL_NODE, LAMBERTIAN_MATERIAL,
            MESH_NODE, METAL_MATERIAL, SPHERE_NODE, TRIANGLE_NODE,
        },
    },
    anyhow::Result,
    bytemuck::Pod,
    glam::{vec3, Mat4, Vec2, Vec3, Vec4},
    ornament_core::math,
};

const FINISH_TRAVERSE_BLAS: u32 = 0xffff_ffff;
const BVH_STACK_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug)]
struct Ray {
    origin: Vec3,
    direction: Vec3,
}

impl Ray {
    fn at(&self, t: f32) -> Vec3 { self.origin + t * self.direction }
}

struct HitRecord {
    p: Vec3,
    normal: Vec3,
    uv: Vec2,
    front_face: bool,
    material_id: u32,
}

impl HitRecord {
    fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3) {
        if ray.direction.dot(outward_normal) > 0.0 {
            self.normal = -outward_normal;
            self.front_face = false;
        } else {
            self.normal = outward_normal;
            self.front_face = true;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct BvhHitResult {
    t: f32,
    material_id: u32,
    node_type: u32,
    inverted_transform_id: u32,
    triangle_id: u32,
    barycentric: Vec2,
}

/// Device arrays decoded into host vectors. Transforms are stored
/// transposed on the device; they are transposed back on decode.
struct Buffers {
    tlas: Vec<BvhNode>,
    blas: Vec<BvhNode>,
    normals: Vec<Vec4>,
    normal_indices: Vec<u32>,
    uvs: Vec<Vec2>,
    uv_indices: Vec<u32>,
    transforms: Vec<Mat4>,
    materials: Vec<GpuMaterial>,
    textures: Vec<u64>,
}

fn read_array<T: Pod>(state: &SoftwareState, raw: &RawArray) -> Result<Vec<T>> {
    if raw.len == 0 {
        return Ok(Vec::new());
    }
    let bytes = state.bytes(raw.dptr)?;
    let needed = raw.len as usize * std::mem::size_of::<T>();
    if needed > bytes.len() {
        return Err(DeviceError::Runtime(format!(
            "array of {} elements does not fit its {}-byte allocation",
            raw.len,
            bytes.len()
        ))
        .into());
    }
    Ok(bytemuck::pod_collect_to_vec(&bytes[..needed]))
}

fn write_array<T: Pod>(state: &mut SoftwareState, raw: &RawArray, data: &[T]) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let alloc = state.bytes_mut(raw.dptr)?;
    alloc[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn decode(state: &SoftwareState, args: &KernelArgs) -> Result<Buffers> {
    let raw_transforms: Vec<Mat4> = read_array(state, &args.transforms)?;
    Ok(Buffers {
        tlas: read_array(state, &args.tlas_nodes)?,
        blas: read_array(state, &args.blas_nodes)?,
        normals: read_array(state, &args.normals)?,
        normal_indices: read_array(state, &args.normal_indices)?,
        uvs: read_array(state, &args.uvs)?,
        uv_indices: read_array(state, &args.uv_indices)?,
        transforms: raw_transforms.iter().map(|m| m.transpose()).collect(),
        materials: read_array(state, &args.materials)?,
        textures: read_array(state, &args.textures)?,
    })
}

struct TextureSampler<'a> {
    state: &'a SoftwareState,
    table: &'a [u64],
    textures_count: u32,
}

impl TextureSampler<'_> {
    fn color(&self, literal: Vec3, texture_id: u32, uv: Vec2) -> Vec3 {
        if texture_id < self.textures_count {
            match self.table.get(texture_id as usize) {
                Some(&handle) => self.sample(handle, uv).unwrap_or(literal),
                None => literal,
            }
        } else {
            literal
        }
    }

    fn sample(&self, handle: u64, uv: Vec2) -> Option<Vec3> {
        let desc = self.state.textures.get(&handle)?;
        let bytes = self.state.allocations.get(&desc.data.0)?;

        let wrap = |c: f32| c - c.floor();
        let x = ((wrap(uv.x) * desc.width as f32) as u32).min(desc.width - 1);
        let y = ((wrap(uv.y) * desc.height as f32) as u32).min(desc.height - 1);

        let bytes_per_component = match desc.format {
            TextureFormat::U8 => 1,
            TextureFormat::F32 => 4,
        };
        let texel = y as usize * desc.pitch as usize
            + (x * desc.num_channels) as usize * bytes_per_component;

        let mut rgb = [0.0f32; 3];
        for (channel, value) in rgb.iter_mut().enumerate().take(desc.num_channels.min(3) as usize)
        {
            let at = texel + channel * bytes_per_component;
            *value = match desc.format {
                TextureFormat::U8 => *bytes.get(at)? as f32 / 255.0,
                TextureFormat::F32 => {
                    f32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?)
                }
            };
        }
        Some(Vec3::from_array(rgb))
    }
}

fn safe_invdir(d: Vec3) -> Vec3 {
    const EPS: f32 = 1e-5;
    let fix = |v: f32| {
        if v.abs() > EPS {
            v
        } else if v < 0.0 {
            -EPS
        } else {
            EPS
        }
    };
    Vec3::new(1.0 / fix(d.x), 1.0 / fix(d.y), 1.0 / fix(d.z))
}

fn aabb_hit(
    aabb_min: Vec3,
    aabb_max: Vec3,
    invdir: Vec3,
    oxinvdir: Vec3,
    tmin: f32,
    tmax: f32,
) -> (f32, f32) {
    let f = aabb_max * invdir + oxinvdir;
    let n = aabb_min * invdir + oxinvdir;
    let t1 = f.max(n).min_element().min(tmax);
    let t0 = f.min(n).max_element().max(tmin);
    (t0, t1)
}

fn triangle_hit(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3, tmin: f32, tmax: f32) -> Option<(f32, Vec2)> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;

    let s1 = ray.direction.cross(e2);
    let determinant = s1.dot(e1);
    let invd = 1.0 / determinant;

    let d = ray.origin - v0;
    let u = d.dot(s1) * invd;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let s2 = d.cross(e1);
    let v = ray.direction.dot(s2) * invd;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(s2) * invd;
    if t < tmin || t > tmax {
        return None;
    }
    Some((t, Vec2::new(u, v)))
}

/// Analytic intersection with the canonical unit sphere at the origin.
fn sphere_hit(ray: &Ray, tmin: f32, tmax: f32) -> Option<f32> {
    let oc = ray.origin;
    let a = ray.direction.length_squared();
    let half_b = oc.dot(ray.direction);
    let c = oc.length_squared() - 1.0;
    let discriminant = half_b * half_b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrtd = discriminant.sqrt();

    let mut t = (-half_b - sqrtd) / a;
    if t < tmin || tmax < t {
        t = (-half_b + sqrtd) / a;
        if t < tmin || tmax < t {
            return None;
        }
    }
    Some(t)
}

fn transform_ray(inverted_transform: &Mat4, ray: &Ray) -> Ray {
    Ray {
        origin: math::transform_point(inverted_transform, ray.origin),
        direction: math::transform_vector(inverted_transform, ray.direction),
    }
}

fn bvh_hit(buffers: &Buffers, not_transformed_ray: &Ray, ray_cast_epsilon: f32) -> Option<BvhHitResult> {
    if buffers.tlas.is_empty() {
        return None;
    }

    let tmin = ray_cast_epsilon;
    let mut tmax = f32::MAX;

    let mut stack = [0u32; BVH_STACK_DEPTH];
    let mut stack_top: i32 = 0;
    let mut addr = buffers.tlas.len() as u32 - 1;
    stack[0] = addr;
    let mut traverse_tlas = true;

    let mut ray = *not_transformed_ray;
    let mut invdir = safe_invdir(ray.direction);
    let mut oxinvdir = -ray.origin * invdir;
    let not_transformed_invdir = invdir;
    let not_transformed_oxinvdir = oxinvdir;

    let mut hit = None;
    let mut material_id = 0u32;
    let mut inverted_transform_id = 0u32;

    while stack_top >= 0 {
        let node = if traverse_tlas {
            &buffers.tlas[addr as usize]
        } else {
            &buffers.blas[addr as usize]
        };

        match node.node_type {
            INTERNAL_NODE => {
                let left = aabb_hit(
                    Vec3::from_array(node.left_aabb_min_or_v0),
                    Vec3::from_array(node.left_aabb_max_or_v1),
                    invdir,
                    oxinvdir,
                    tmin,
                    tmax,
                );
                let right = aabb_hit(
                    Vec3::from_array(node.right_aabb_min_or_v2),
                    Vec3::from_array(node.right_aabb_max_or_v3),
                    invdir,
                    oxinvdir,
                    tmin,
                    tmax,
                );

                if left.0 <= left.1 {
                    stack_top += 1;
                    stack[stack_top as usize] = node.left_or_custom_id;
                }
                if right.0 <= right.1 {
                    stack_top += 1;
                    stack[stack_top as usize] = node.right_or_material_index;
                }
            }
            SPHERE_NODE => {
                let inverted = node.transform_id * 2;
                let local_ray = transform_ray(&buffers.transforms[inverted as usize], &ray);
                if let Some(t) = sphere_hit(&local_ray, tmin, tmax) {
                    if t < tmax {
                        tmax = t;
                        hit = Some(BvhHitResult {
                            t,
                            material_id: node.right_or_material_index,
                            node_type: SPHERE_NODE,
                            inverted_transform_id: inverted,
                            ..BvhHitResult::default()
                        });
                    }
                }
            }
            MESH_NODE => {
                // Push the restore sentinel, then the BLAS root.
                traverse_tlas = false;
                stack_top += 1;
                stack[stack_top as usize] = FINISH_TRAVERSE_BLAS;
                stack_top += 1;
                stack[stack_top as usize] = node.left_or_custom_id;

                inverted_transform_id = node.transform_id * 2;
                material_id = node.right_or_material_index;
                ray = transform_ray(
                    &buffers.transforms[inverted_transform_id as usize],
                    not_transformed_ray,
                );
                invdir = safe_invdir(ray.direction);
                oxinvdir = -ray.origin * invdir;
            }
            TRIANGLE_NODE => {
                let hit_test = triangle_hit(
                    &ray,
                    Vec3::from_array(node.left_aabb_min_or_v0),
                    Vec3::from_array(node.left_aabb_max_or_v1),
                    Vec3::from_array(node.right_aabb_min_or_v2),
                    tmin,
                    tmax,
                );
                if let Some((t, uv)) = hit_test {
                    if t < tmax {
                        tmax = t;
                        hit = Some(BvhHitResult {
                            t,
                            material_id,
                            node_type: MESH_NODE,
                            inverted_transform_id,
                            triangle_id: node.left_or_custom_id * 3,
                            barycentric: uv,
                        });
                    }
                }
            }
            _ => {}
        }

        addr = stack[stack_top as usize];
        stack_top -= 1;

        if addr == FINISH_TRAVERSE_BLAS {
            traverse_tlas = true;
            ray = *not_transformed_ray;
            invdir = not_transformed_invdir;
            oxinvdir = not_transformed_oxinvdir;
            addr = stack[stack_top as usize];
            stack_top -= 1;
        }
    }

    hit
}

fn camera_get_ray(camera: &GpuCamera, rnd: &mut RndGen, s: f32, t: f32) -> Ray {
    let rd = camera.lens_radius * rnd.gen_in_unit_disk();
    let u = Vec3::from_array(camera.u);
    let v = Vec3::from_array(camera.v);
    let offset = u * rd.x + v * rd.y;

    let origin = Vec3::from_array(camera.origin);
    Ray {
        origin: origin + offset,
        direction: Vec3::from_array(camera.lower_left_corner)
            + s * Vec3::from_array(camera.horizontal)
            + t * Vec3::from_array(camera.vertical)
            - origin
            - offset,
    }
}

fn reflect(v: Vec3, n: Vec3) -> Vec3 { v - 2.0 * v.dot(n) * n }

fn refract(uv: Vec3, n: Vec3, etai_over_etat: f32) -> Vec3 {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.length_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}

/// Schlick's approximation for reflectance.
fn reflectance(cosine: f32, ref_idx: f32) -> f32 {
    let r0 = ((1.0 - ref_idx) / (1.0 + ref_idx)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powf(5.0)
}

fn near_zero(v: Vec3) -> bool {
    const EPS: f32 = 1e-8;
    v.x.abs() < EPS && v.y.abs() < EPS && v.z.abs() < EPS
}

fn scatter(
    material: &GpuMaterial,
    ray: &Ray,
    hit: &HitRecord,
    rnd: &mut RndGen,
    sampler: &TextureSampler,
) -> Option<(Vec3, Ray)> {
    let albedo = Vec3::from_array(material.albedo);
    match material.material_type {
        LAMBERTIAN_MATERIAL => {
            let mut direction = hit.normal + rnd.gen_unit_vector();
            if near_zero(direction) {
                direction = hit.normal;
            }
            let attenuation = sampler.color(albedo, material.albedo_texture_index, hit.uv);
            Some((attenuation, Ray { origin: hit.p, direction }))
        }
        METAL_MATERIAL => {
            let direction = reflect(ray.direction.normalize(), hit.normal)
                + material.fuzz * rnd.gen_in_unit_sphere();
            let attenuation = sampler.color(albedo, material.albedo_texture_index, hit.uv);
            Some((attenuation, Ray { origin: hit.p, direction }))
        }
        DIELECTRIC_MATERIAL => {
            let refraction_ratio = if hit.front_face {
                1.0 / material.ior
            } else {
                material.ior
            };

            let unit_direction = ray.direction.normalize();
            let cos_theta = (-unit_direction).dot(hit.normal).min(1.0);
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

            let cannot_refract = refraction_ratio * sin_theta > 1.0;
            let direction = if cannot_refract
                || reflectance(cos_theta, refraction_ratio) > rnd.gen_float()
            {
                reflect(unit_direction, hit.normal)
            } else {
                refract(unit_direction, hit.normal, refraction_ratio)
            };

            Some((Vec3::ONE, Ray { origin: hit.p, direction }))
        }
        _ => None,
    }
}

fn emit(material: &GpuMaterial, hit: &HitRecord, sampler: &TextureSampler) -> Vec3 {
    if material.material_type == DIFFUSE_LIGHT_MATERIAL {
        sampler.color(
            Vec3::from_array(material.albedo),
            material.albedo_texture_index,
            hit.uv,
        )
    } else {
        Vec3::ZERO
    }
}

pub(super) fn path_tracing(
    state: &mut SoftwareState,
    params: &ConstantParams,
    args: &KernelArgs,
    thread_count: u64,
) -> Result<()> {
    let buffers = decode(state, args)?;
    let mut accumulation: Vec<Vec4> = read_array(state, &args.accumulation_buffer)?;
    let mut rng_seeds: Vec<u32> = read_array(state, &args.rng_seed_buffer)?;

    let pixel_count = (args.pixel_count as u64).min(thread_count) as usize;
    {
        let sampler = TextureSampler {
            state,
            table: &buffers.textures,
            textures_count: params.textures_count,
        };

        for pixel in 0..pixel_count {
            let mut rnd = RndGen::new(rng_seeds[pixel]);
            let x = pixel as u32 % params.width;
            let y = pixel as u32 / params.width;
            let u = (x as f32 + rnd.gen_float()) / (params.width - 1) as f32;
            let v = (y as f32 + rnd.gen_float()) / (params.height - 1) as f32;

            let mut ray = camera_get_ray(&params.camera, &mut rnd, u, v);
            let mut final_color = Vec3::ONE;

            for _ in 0..params.depth {
                let Some(bvh_result) = bvh_hit(&buffers, &ray, params.ray_cast_epsilon) else {
                    let unit_direction = ray.direction.normalize();
                    let tt = 0.5 * (unit_direction.y + 1.0);
                    final_color *= Vec3::ONE.lerp(vec3(0.5, 0.7, 1.0), tt);
                    break;
                };

                let forward_transform_id = bvh_result.inverted_transform_id + 1;
                let mut hit = HitRecord {
                    p: ray.at(bvh_result.t),
                    normal: Vec3::ZERO,
                    uv: Vec2::ZERO,
                    front_face: false,
                    material_id: bvh_result.material_id,
                };

                match bvh_result.node_type {
                    SPHERE_NODE => {
                        let center = math::transform_point(
                            &buffers.transforms[forward_transform_id as usize],
                            Vec3::ZERO,
                        );
                        let outward_normal = (hit.p - center).normalize();
                        hit.uv = math::sphere_tex_coord(outward_normal);
                        hit.set_face_normal(&ray, outward_normal);
                    }
                    MESH_NODE => {
                        let tri = bvh_result.triangle_id as usize;
                        let n0 = buffers.normals[buffers.normal_indices[tri] as usize];
                        let n1 = buffers.normals[buffers.normal_indices[tri + 1] as usize];
                        let n2 = buffers.normals[buffers.normal_indices[tri + 2] as usize];

                        let uv0 = buffers.uvs[buffers.uv_indices[tri] as usize];
                        let uv1 = buffers.uvs[buffers.uv_indices[tri + 1] as usize];
                        let uv2 = buffers.uvs[buffers.uv_indices[tri + 2] as usize];

                        let bu = bvh_result.barycentric.x;
                        let bv = bvh_result.barycentric.y;
                        let bw = 1.0 - bu - bv;

                        let normal = bw * n0 + bu * n1 + bv * n2;
                        hit.uv = bw * uv0 + bu * uv1 + bv * uv2;
                        let outward_normal = math::transform_normal(
                            &buffers.transforms[bvh_result.inverted_transform_id as usize],
                            normal.truncate(),
                        )
                        .normalize();
                        hit.set_face_normal(&ray, outward_normal);
                    }
                    _ => {}
                }

                let material = &buffers.materials[hit.material_id as usize];
                if let Some((attenuation, scattered)) =
                    scatter(material, &ray, &hit, &mut rnd, &sampler)
                {
                    ray = scattered;
                    final_color *= attenuation;
                } else {
                    final_color *= emit(material, &hit, &sampler);
                    break;
                }
            }

            let mut rgba = final_color.extend(1.0);
            if params.current_iteration > 1.0 {
                rgba += accumulation[pixel];
            }
            accumulation[pixel] = rgba;
            rng_seeds[pixel] = rnd.state;
        }
    }

    write_array(state, &args.accumulation_buffer, &accumulation)?;
    write_array(state, &args.rng_seed_buffer, &rng_seeds)?;
    Ok(())
}

pub(super) fn post_processing(
    state: &mut SoftwareState,
    params: &ConstantParams,
    args: &KernelArgs,
    thread_count: u64,
) -> Result<()> {
    let accumulation: Vec<Vec4> = read_array(state, &args.accumulation_buffer)?;
    let mut framebuffer: Vec<Vec4> = read_array(state, &args.framebuffer)?;

    let pixel_count = (args.pixel_count as u64).min(thread_count) as usize;
    for pixel in 0..pixel_count {
        let mut rgba = accumulation[pixel] / params.current_iteration;
        rgba.x = rgba.x.powf(params.inverted_gamma);
        rgba.y = rgba.y.powf(params.inverted_gamma);
        rgba.z = rgba.z.powf(params.inverted_gamma);
        rgba = rgba.clamp(Vec4::ZERO, Vec4::ONE);

        let mut fb_index = pixel;
        if params.flip_y != 0 {
            let x = pixel as u32 % params.width;
            let y = pixel as u32 / params.width;
            fb_index = (params.width * (params.height - y - 1) + x) as usize;
        }
        framebuffer[fb_index] = rgba;
    }

    write_array(state, &args.framebuffer, &framebuffer)?;
    Ok(())
}
