use {
    crate::{
        buffer::{Array, RawArray},
        device::{align_up, Device, DevicePtr, TextureFormat, TextureObjectDesc, TextureObjectId},
    },
    anyhow::Result,
    ornament_scene::Texture,
    std::sync::Arc,
};

/// Device residency for the scene's textures: one pitched 2-D allocation
/// and one sampler object per texture, plus a linear table of the sampler
/// handles indexed by texture id.
#[derive(Debug)]
pub struct Textures {
    device: Arc<dyn Device>,
    objects: Vec<TextureObjectId>,
    data: Vec<DevicePtr>,
    table: Array<u64>,
}

impl Textures {
    /// `textures` must be ordered by their registered texture ids.
    pub fn new(device: &Arc<dyn Device>, textures: &[&Texture]) -> Result<Self> {
        let alignment = device.pitch_alignment();
        let mut objects = Vec::with_capacity(textures.len());
        let mut data = Vec::with_capacity(textures.len());

        for texture in textures {
            let src_pitch = texture.bytes_per_row as u64;
            let dst_pitch = align_up(src_pitch, alignment);

            let dptr = device.malloc(dst_pitch * texture.height as u64)?;
            data.push(dptr);
            device.copy_to_device_2d(
                dptr,
                dst_pitch,
                &texture.data,
                src_pitch,
                src_pitch,
                texture.height as u64,
            )?;

            let object = device.create_texture_object(&TextureObjectDesc {
                data: dptr,
                pitch: dst_pitch,
                width: texture.width,
                height: texture.height,
                num_channels: texture.num_components,
                format: if texture.is_hdr {
                    TextureFormat::F32
                } else {
                    TextureFormat::U8
                },
            })?;
            objects.push(object);
        }

        let handles = objects.iter().map(|object| object.0).collect::<Vec<_>>();
        let table = Array::from_slice(device, &handles)?;

        Ok(Self {
            device: device.clone(),
            objects,
            data,
            table,
        })
    }

    pub fn count(&self) -> u32 { self.objects.len() as u32 }

    pub fn raw(&self) -> RawArray { self.table.raw() }
}

impl Drop for Textures {
    fn drop(&mut self) {
        for object in self.objects.drain(..) {
            if let Err(e) = self.device.destroy_texture_object(object) {
                log::error!("Failed to destroy {object:?}: {e}");
            }
        }
        for dptr in self.data.drain(..) {
            if let Err(e) = self.device.free(dptr) {
                log::error!("Failed to free {dptr:?}: {e}");
            }
        }
    }
}
