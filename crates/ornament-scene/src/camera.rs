use glam::{vec3, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct CameraConfig {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub vup: Vec3,
    pub aspect_ratio: f32,
    pub vfov: f32,
    pub aperture: f32,
    pub focus_dist: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            look_from: vec3(0.0, 0.0, 3.0),
            look_at: Vec3::ZERO,
            vup: Vec3::Y,
            aspect_ratio: 1.0,
            vfov: 60.0,
            aperture: 0.0,
            focus_dist: 3.0,
        }
    }
}

/// Thin-lens pinhole camera. All derived quantities are recomputed by the
/// setters; any change marks the camera dirty so accumulation restarts.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    origin: Vec3,
    lower_left_corner: Vec3,
    horizontal: Vec3,
    vertical: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    lens_radius: f32,
    focus_dist: f32,
    vfov: f32,
    aspect_ratio: f32,
    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,
    dirty: bool,
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        let theta = config.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = config.aspect_ratio * viewport_height;

        let w = (config.look_from - config.look_at).normalize();
        let u = config.vup.cross(w).normalize();
        let v = w.cross(u);

        let origin = config.look_from;
        let horizontal = config.focus_dist * viewport_width * u;
        let vertical = config.focus_dist * viewport_height * v;
        let lower_left_corner =
            origin - horizontal / 2.0 - vertical / 2.0 - config.focus_dist * w;

        Self {
            origin,
            lower_left_corner,
            horizontal,
            vertical,
            u,
            v,
            w,
            lens_radius: config.aperture / 2.0,
            focus_dist: config.focus_dist,
            vfov: config.vfov,
            aspect_ratio: config.aspect_ratio,
            look_from: config.look_from,
            look_at: config.look_at,
            vup: config.vup,
            dirty: true,
        }
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        *self = Self::new(CameraConfig {
            aspect_ratio,
            ..self.config()
        });
    }

    pub fn set_look_at(&mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) {
        *self = Self::new(CameraConfig {
            look_from,
            look_at,
            vup,
            ..self.config()
        });
    }

    fn config(&self) -> CameraConfig {
        CameraConfig {
            look_from: self.look_from,
            look_at: self.look_at,
            vup: self.vup,
            aspect_ratio: self.aspect_ratio,
            vfov: self.vfov,
            aperture: 2.0 * self.lens_radius,
            focus_dist: self.focus_dist,
        }
    }

    pub fn look_from(&self) -> Vec3 { self.look_from }

    pub fn look_at(&self) -> Vec3 { self.look_at }

    pub fn vup(&self) -> Vec3 { self.vup }

    pub fn aspect_ratio(&self) -> f32 { self.aspect_ratio }

    pub fn u(&self) -> Vec3 { self.u }

    pub fn v(&self) -> Vec3 { self.v }

    pub fn w(&self) -> Vec3 { self.w }

    pub fn lower_left_corner(&self) -> Vec3 { self.lower_left_corner }

    pub fn horizontal(&self) -> Vec3 { self.horizontal }

    pub fn vertical(&self) -> Vec3 { self.vertical }

    pub fn origin(&self) -> Vec3 { self.origin }

    pub fn lens_radius(&self) -> f32 { self.lens_radius }

    pub fn is_dirty(&self) -> bool { self.dirty }

    pub fn set_dirty(&mut self, dirty: bool) { self.dirty = dirty; }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::new(CameraConfig {
            look_from: vec3(0.0, 0.0, 3.0),
            look_at: Vec3::ZERO,
            vup: Vec3::Y,
            aspect_ratio: 1.0,
            vfov: 90.0,
            aperture: 0.5,
            focus_dist: 3.0,
        })
    }

    #[test]
    fn derivation_builds_orthonormal_basis() {
        let camera = test_camera();
        assert!((camera.w() - Vec3::Z).length() < 1e-6);
        assert!((camera.u() - Vec3::X).length() < 1e-6);
        assert!((camera.v() - Vec3::Y).length() < 1e-6);
        assert!((camera.lens_radius() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn derivation_spans_viewport() {
        let camera = test_camera();
        // vfov 90 at focus 3 gives a 6x6 viewport plane.
        assert!((camera.horizontal() - vec3(6.0, 0.0, 0.0)).length() < 1e-5);
        assert!((camera.vertical() - vec3(0.0, 6.0, 0.0)).length() < 1e-5);
        assert!((camera.lower_left_corner() - vec3(-3.0, -3.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn setters_rederive_and_mark_dirty() {
        let mut camera = test_camera();
        camera.set_dirty(false);

        camera.set_aspect_ratio(2.0);
        assert!(camera.is_dirty());
        assert!((camera.horizontal() - vec3(12.0, 0.0, 0.0)).length() < 1e-5);
        // Aperture survives re-derivation.
        assert!((camera.lens_radius() - 0.25).abs() < 1e-6);

        camera.set_dirty(false);
        camera.set_look_at(vec3(0.0, 0.0, -3.0), Vec3::ZERO, Vec3::Y);
        assert!(camera.is_dirty());
        assert!((camera.w() + Vec3::Z).length() < 1e-6);
    }
}
