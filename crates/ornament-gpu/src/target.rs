use {
    crate::{buffer::Array, device::Device, kernel::WORKGROUP_SIZE},
    anyhow::Result,
    glam::{UVec2, Vec4},
    std::sync::Arc,
};

/// The per-pixel render target triple: framebuffer, accumulation buffer and
/// RNG seeds. Seeds start out as the pixel index sequence and evolve on the
/// device from there.
#[derive(Debug)]
pub struct Target {
    buffer: Array<Vec4>,
    accumulation_buffer: Array<Vec4>,
    rng_state_buffer: Array<u32>,
    resolution: UVec2,
    workgroups: u32,
    pixel_count: u32,
}

impl Target {
    pub fn new(device: &Arc<dyn Device>, resolution: UVec2) -> Result<Self> {
        let pixel_count = resolution.x * resolution.y;

        let seeds = (0..pixel_count).collect::<Vec<u32>>();
        let mut workgroups = pixel_count / WORKGROUP_SIZE;
        if pixel_count % WORKGROUP_SIZE > 0 {
            workgroups += 1;
        }

        Ok(Self {
            buffer: Array::new(device, pixel_count as usize)?,
            accumulation_buffer: Array::new(device, pixel_count as usize)?,
            rng_state_buffer: Array::from_slice(device, &seeds)?,
            resolution,
            workgroups,
            pixel_count,
        })
    }

    pub fn buffer(&self) -> &Array<Vec4> { &self.buffer }

    pub fn accumulation_buffer(&self) -> &Array<Vec4> { &self.accumulation_buffer }

    pub fn rng_state_buffer(&self) -> &Array<u32> { &self.rng_state_buffer }

    pub fn resolution(&self) -> UVec2 { self.resolution }

    pub fn workgroups(&self) -> u32 { self.workgroups }

    pub fn pixel_count(&self) -> u32 { self.pixel_count }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::software::SoftwareDevice, glam::uvec2};

    #[test]
    fn workgroups_round_up() {
        let device: Arc<dyn Device> = Arc::new(SoftwareDevice::new());

        let target = Target::new(&device, uvec2(16, 16)).unwrap();
        assert_eq!(target.pixel_count(), 256);
        assert_eq!(target.workgroups(), 1);

        let target = Target::new(&device, uvec2(16, 17)).unwrap();
        assert_eq!(target.workgroups(), 2);
    }

    #[test]
    fn rng_seeds_are_the_pixel_sequence() {
        let device: Arc<dyn Device> = Arc::new(SoftwareDevice::new());
        let target = Target::new(&device, uvec2(4, 2)).unwrap();

        let mut bytes = vec![0u8; target.rng_state_buffer().size_in_bytes()];
        target.rng_state_buffer().read_bytes(&mut bytes).unwrap();
        let seeds: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(seeds, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
