use {
    crate::math,
    glam::{Mat4, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::INFINITY,
            max: Vec3::NEG_INFINITY,
        }
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self { Self { min, max } }

    pub fn min(&self) -> Vec3 { self.min }

    pub fn max(&self) -> Vec3 { self.max }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn merge(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// AABB of the eight corners of `aabb` mapped through `m`.
    pub fn transform(m: &Mat4, aabb: &Aabb) -> Aabb {
        let (lo, hi) = (aabb.min, aabb.max);
        let corners = [
            lo,
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, lo.y, hi.z),
            hi,
        ];

        let mut result = Aabb::default();
        for corner in corners {
            result.grow(math::transform_point(m, corner));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use {super::*, glam::vec3, std::f32::consts::FRAC_PI_4};

    #[test]
    fn grow_expands_bounds() {
        let mut aabb = Aabb::default();
        aabb.grow(vec3(1.0, -1.0, 0.0));
        aabb.grow(vec3(-2.0, 3.0, 0.5));
        assert_eq!(aabb.min(), vec3(-2.0, -1.0, 0.0));
        assert_eq!(aabb.max(), vec3(1.0, 3.0, 0.5));
    }

    #[test]
    fn merge_unions_boxes() {
        let mut a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(vec3(-1.0, 0.5, 0.0), vec3(0.5, 2.0, 1.0));
        a.merge(&b);
        assert_eq!(a.min(), vec3(-1.0, 0.0, 0.0));
        assert_eq!(a.max(), vec3(0.5, 2.0, 1.0));
    }

    #[test]
    fn transform_translates_bounds() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_translation(vec3(10.0, 0.0, 0.0));
        let moved = Aabb::transform(&m, &aabb);
        assert_eq!(moved.min(), vec3(10.0, 0.0, 0.0));
        assert_eq!(moved.max(), vec3(11.0, 1.0, 1.0));
    }

    #[test]
    fn transform_covers_rotated_corners() {
        // A unit box rotated 45 degrees about Y widens to sqrt(2) in XZ.
        let aabb = Aabb::new(vec3(-0.5, -0.5, -0.5), vec3(0.5, 0.5, 0.5));
        let m = Mat4::from_rotation_y(FRAC_PI_4);
        let rotated = Aabb::transform(&m, &aabb);
        let half = std::f32::consts::SQRT_2 / 2.0;
        assert!((rotated.max().x - half).abs() < 1e-6);
        assert!((rotated.min().z + half).abs() < 1e-6);
        assert!((rotated.max().y - 0.5).abs() < 1e-6);
    }
}
