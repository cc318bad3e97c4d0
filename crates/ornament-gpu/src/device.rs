use {
    anyhow::Result,
    std::{fmt, path::Path},
};

/// Opaque device memory address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureObjectId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    U8,
    F32,
}

/// Description of a sampled 2-D texture over pitched device memory.
/// Addressing wraps on both axes, filtering is point sampling and
/// coordinates are normalized.
#[derive(Clone, Copy, Debug)]
pub struct TextureObjectDesc {
    pub data: DevicePtr,
    pub pitch: u64,
    pub width: u32,
    pub height: u32,
    pub num_channels: u32,
    pub format: TextureFormat,
}

/// The GPU driver surface the renderer runs against: module loading, memory
/// transfers and raw kernel launches. Implementations wrap a real driver
/// runtime; [`crate::SoftwareDevice`] interprets the kernels in-process.
///
/// Kernel launches take the argument struct as raw bytes; grid and block
/// dimensions are one-dimensional. Launches are ordered by the device's
/// stream semantics, so no explicit synchronization is exposed.
pub trait Device: fmt::Debug + Send + Sync {
    fn name(&self) -> String;

    /// Required row alignment for 2-D pitched allocations.
    fn pitch_alignment(&self) -> u64;

    fn load_module(&self, path: &Path) -> Result<ModuleId>;

    fn unload_module(&self, module: ModuleId) -> Result<()>;

    fn get_function(&self, module: ModuleId, name: &str) -> Result<FunctionId>;

    /// Resolves a module-global symbol to its address and byte size.
    fn get_global(&self, module: ModuleId, name: &str) -> Result<(DevicePtr, u64)>;

    fn malloc(&self, size: u64) -> Result<DevicePtr>;

    fn free(&self, dptr: DevicePtr) -> Result<()>;

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;

    /// Copies `dst.len()` bytes from device memory; reads shorter than the
    /// allocation truncate.
    fn copy_from_device(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;

    fn copy_to_device_2d(
        &self,
        dst: DevicePtr,
        dst_pitch: u64,
        src: &[u8],
        src_pitch: u64,
        width_bytes: u64,
        rows: u64,
    ) -> Result<()>;

    fn create_texture_object(&self, desc: &TextureObjectDesc) -> Result<TextureObjectId>;

    fn destroy_texture_object(&self, object: TextureObjectId) -> Result<()>;

    fn launch(&self, function: FunctionId, grid_dim: u32, block_dim: u32, args: &[u8])
        -> Result<()>;
}

pub fn align_up(offset: u64, alignment: u64) -> u64 {
    (offset + alignment - 1) & !(alignment - 1)
}
