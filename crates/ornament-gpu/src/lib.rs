pub mod buffer;
pub mod device;
pub mod error;
pub mod kernel;
pub mod software;
pub mod target;
pub mod texture;

pub use {
    buffer::{Array, Global, RawArray},
    device::{
        align_up, Device, DevicePtr, FunctionId, ModuleId, TextureFormat, TextureObjectDesc,
        TextureObjectId,
    },
    error::DeviceError,
    software::SoftwareDevice,
    target::Target,
    texture::Textures,
};
