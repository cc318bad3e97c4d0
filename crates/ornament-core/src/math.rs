use {
    glam::{Mat4, Quat, Vec2, Vec3},
    std::f32::consts::PI,
};

pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 { (*m * p.extend(1.0)).truncate() }

pub fn transform_vector(m: &Mat4, v: Vec3) -> Vec3 { (*m * v.extend(0.0)).truncate() }

/// Normals transform through the transpose of the inverse transform.
pub fn transform_normal(inverted: &Mat4, n: Vec3) -> Vec3 {
    (inverted.transpose() * n.extend(0.0)).truncate()
}

pub fn approx_eq(a: f32, b: f32) -> bool {
    const EPS: f32 = 1e-7;
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= EPS
}

/// Rotation matrix aligning `a` with `b` (neither needs to be unit length).
///
/// Anti-parallel inputs rotate 180 degrees about an axis orthogonal to `a`,
/// preferring `a x X` and falling back to `a x Y` when that degenerates.
pub fn rotation_between_vectors(a: Vec3, b: Vec3) -> Mat4 {
    let k_cos_theta = a.dot(b);
    if approx_eq(k_cos_theta, 1.0) {
        return Mat4::IDENTITY;
    }

    let k = (a.length_squared() * b.length_squared()).sqrt();
    if approx_eq(k_cos_theta / k, -1.0) {
        let mut orthogonal = a.cross(Vec3::X);
        if approx_eq(orthogonal.length_squared(), 0.0) {
            orthogonal = a.cross(Vec3::Y);
        }
        let orthogonal = orthogonal.normalize();
        return Mat4::from_quat(Quat::from_xyzw(orthogonal.x, orthogonal.y, orthogonal.z, 0.0));
    }

    let v = a.cross(b);
    Mat4::from_quat(Quat::from_xyzw(v.x, v.y, v.z, k + k_cos_theta).normalize())
}

/// UV parameterization of a point on the unit sphere.
pub fn sphere_tex_coord(p: Vec3) -> Vec2 {
    let theta = (-p.y).acos();
    let phi = (-p.z).atan2(p.x) + PI;
    Vec2::new(phi / (2.0 * PI), theta / PI)
}
