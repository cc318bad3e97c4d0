//! Headless demo: a small material-show scene rendered through the
//! software device and written out as a PPM image.

use {
    anyhow::Result,
    glam::{uvec2, vec3, Vec3, Vec4},
    ornament_gpu::{Device, SoftwareDevice},
    ornament_render::PathTracer,
    ornament_scene::{Camera, CameraConfig, Scene},
    std::{fs::File, io::Write, path::Path, sync::Arc, time::Instant},
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;

fn build_scene() -> Scene {
    let mut scene = Scene::new(Camera::new(CameraConfig {
        look_from: vec3(0.0, 2.0, 8.0),
        look_at: vec3(0.0, 1.0, 0.0),
        vup: Vec3::Y,
        aspect_ratio: WIDTH as f32 / HEIGHT as f32,
        vfov: 45.0,
        aperture: 0.0,
        focus_dist: 8.0,
    }));

    let ground = scene.lambertian(vec3(0.5, 0.5, 0.5));
    let clay = scene.lambertian(vec3(0.4, 0.2, 0.1));
    let steel = scene.metal(vec3(0.7, 0.6, 0.5), 0.05);
    let glass = scene.dielectric(1.5);
    let lamp = scene.diffuse_light(vec3(4.0, 4.0, 4.0));

    let floor = scene.plane_mesh(Vec3::ZERO, 40.0, 40.0, Vec3::Y, ground);
    scene.attach_mesh(floor);

    let left = scene.sphere(vec3(-2.5, 1.0, 0.0), 1.0, clay);
    let middle = scene.sphere(vec3(0.0, 1.0, 0.0), 1.0, glass);
    let right = scene.sphere_mesh(vec3(2.5, 1.0, 0.0), 1.0, steel);
    let light = scene.sphere(vec3(0.0, 6.0, 2.0), 1.5, lamp);
    scene.attach_sphere(left);
    scene.attach_sphere(middle);
    scene.attach_mesh(right);
    scene.attach_sphere(light);

    let state = scene.state_mut();
    state.set_resolution(uvec2(WIDTH, HEIGHT));
    state.set_depth(6);
    state.set_iterations(8);
    state.set_gamma(2.2);
    scene
}

fn write_ppm(path: &Path, pixels: &[Vec4]) -> Result<()> {
    let mut file = File::create(path)?;
    write!(file, "P6\n{WIDTH} {HEIGHT}\n255\n")?;
    for pixel in pixels {
        let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u8;
        file.write_all(&[to_byte(pixel.x), to_byte(pixel.y), to_byte(pixel.z)])?;
    }
    Ok(())
}

fn main() -> Result<()> {
    ornament_core::setup_logger()?;

    let device: Arc<dyn Device> = Arc::new(SoftwareDevice::new());
    let mut tracer = PathTracer::new(device, build_scene(), Path::new("kernels"))?;

    let started = Instant::now();
    tracer.render()?;
    log::info!("Rendered {WIDTH}x{HEIGHT} in {:.2?}", started.elapsed());

    let mut bytes = vec![0u8; tracer.frame_buffer_size()];
    tracer.read_frame_buffer(&mut bytes)?;
    let pixels: Vec<Vec4> = bytemuck::pod_collect_to_vec(&bytes);

    let output = Path::new("spheres.ppm");
    write_ppm(output, &pixels)?;
    log::info!("Wrote {}", output.display());
    Ok(())
}
