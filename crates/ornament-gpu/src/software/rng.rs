use {glam::Vec3, std::f32::consts::PI};

/// Per-pixel PCG generator; the seed is the pixel's persisted RNG word.
#[derive(Clone, Copy, Debug)]
pub struct RndGen {
    pub state: u32,
}

impl RndGen {
    pub fn new(seed: u32) -> Self { Self { state: seed } }

    pub fn gen_u32(&mut self) -> u32 {
        let old_state = self.state.wrapping_add(747796405).wrapping_add(2891336453);
        let word =
            ((old_state >> ((old_state >> 28) + 4)) ^ old_state).wrapping_mul(277803737);
        self.state = (word >> 22) ^ word;
        self.state
    }

    pub fn gen_float(&mut self) -> f32 { self.gen_u32() as f32 * (1.0 / 4294967296.0) }

    pub fn gen_in_unit_sphere(&mut self) -> Vec3 {
        let r = self.gen_float().powf(0.33333);
        let theta = PI * self.gen_float();
        let phi = 2.0 * PI * self.gen_float();

        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_phi, cos_phi) = phi.sin_cos();

        Vec3::new(
            r * sin_theta * cos_phi,
            r * sin_theta * sin_phi,
            r * cos_theta,
        )
    }

    pub fn gen_unit_vector(&mut self) -> Vec3 { self.gen_in_unit_sphere().normalize() }

    pub fn gen_in_unit_disk(&mut self) -> Vec3 {
        // r^2 is distributed as U(0, 1).
        let r = self.gen_float().sqrt();
        let alpha = 2.0 * PI * self.gen_float();

        let (sin_alpha, cos_alpha) = alpha.sin_cos();
        Vec3::new(r * cos_alpha, r * sin_alpha, 0.0)
    }
}
