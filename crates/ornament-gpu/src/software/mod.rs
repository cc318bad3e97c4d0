mod exec;
mod rng;

use {
    crate::{
        device::{
            Device, DevicePtr, FunctionId, ModuleId, TextureObjectDesc, TextureObjectId,
        },
        error::DeviceError,
        kernel::{self, ConstantParams, KernelArgs},
    },
    anyhow::Result,
    std::{collections::HashMap, path::Path, sync::Mutex},
};

const PITCH_ALIGNMENT: u64 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KernelKind {
    PathTracing,
    PostProcessing,
}

#[derive(Debug)]
struct ModuleState {
    constant_params: DevicePtr,
}

#[derive(Debug, Default)]
struct SoftwareState {
    next_id: u64,
    allocations: HashMap<u64, Vec<u8>>,
    modules: HashMap<u64, ModuleState>,
    functions: HashMap<u64, (u64, KernelKind)>,
    textures: HashMap<u64, TextureObjectDesc>,
}

impl SoftwareState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn bytes(&self, dptr: u64) -> Result<&Vec<u8>, DeviceError> {
        self.allocations.get(&dptr).ok_or(DeviceError::InvalidPointer(dptr))
    }

    fn bytes_mut(&mut self, dptr: u64) -> Result<&mut Vec<u8>, DeviceError> {
        self.allocations.get_mut(&dptr).ok_or(DeviceError::InvalidPointer(dptr))
    }
}

/// In-process [`Device`] that executes the path-tracing and post-processing
/// kernels on the CPU over the exact byte layout a hardware module would
/// consume. Reference backend for tests and headless rendering.
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    state: Mutex<SoftwareState>,
}

impl SoftwareDevice {
    pub fn new() -> Self { Self::default() }
}

impl Device for SoftwareDevice {
    fn name(&self) -> String { "ornament software device".to_string() }

    fn pitch_alignment(&self) -> u64 { PITCH_ALIGNMENT }

    fn load_module(&self, path: &Path) -> Result<ModuleId> {
        log::debug!("Loading module {}", path.display());
        let mut state = self.state.lock().unwrap();

        let constant_params_size = std::mem::size_of::<ConstantParams>();
        let params_id = state.fresh_id();
        state.allocations.insert(params_id, vec![0; constant_params_size]);

        let module_id = state.fresh_id();
        state.modules.insert(
            module_id,
            ModuleState {
                constant_params: DevicePtr(params_id),
            },
        );
        Ok(ModuleId(module_id))
    }

    fn unload_module(&self, module: ModuleId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let module_state = state
            .modules
            .remove(&module.0)
            .ok_or(DeviceError::Runtime(format!("unknown module {module:?}")))?;
        state.allocations.remove(&module_state.constant_params.0);
        state.functions.retain(|_, (owner, _)| *owner != module.0);
        Ok(())
    }

    fn get_function(&self, module: ModuleId, name: &str) -> Result<FunctionId> {
        let kind = match name {
            kernel::PATH_TRACING_KERNEL => KernelKind::PathTracing,
            kernel::POST_PROCESSING_KERNEL => KernelKind::PostProcessing,
            _ => {
                return Err(DeviceError::MissingSymbol {
                    name: name.to_string(),
                }
                .into())
            }
        };

        let mut state = self.state.lock().unwrap();
        if !state.modules.contains_key(&module.0) {
            return Err(DeviceError::Runtime(format!("unknown module {module:?}")).into());
        }
        let id = state.fresh_id();
        state.functions.insert(id, (module.0, kind));
        Ok(FunctionId(id))
    }

    fn get_global(&self, module: ModuleId, name: &str) -> Result<(DevicePtr, u64)> {
        if name != kernel::CONSTANT_PARAMS_GLOBAL {
            return Err(DeviceError::MissingSymbol {
                name: name.to_string(),
            }
            .into());
        }

        let state = self.state.lock().unwrap();
        let module_state = state
            .modules
            .get(&module.0)
            .ok_or(DeviceError::Runtime(format!("unknown module {module:?}")))?;
        Ok((
            module_state.constant_params,
            std::mem::size_of::<ConstantParams>() as u64,
        ))
    }

    fn malloc(&self, size: u64) -> Result<DevicePtr> {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id();
        state.allocations.insert(id, vec![0; size as usize]);
        Ok(DevicePtr(id))
    }

    fn free(&self, dptr: DevicePtr) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .allocations
            .remove(&dptr.0)
            .map(|_| ())
            .ok_or_else(|| DeviceError::InvalidPointer(dptr.0).into())
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let bytes = state.bytes_mut(dst.0)?;
        if src.len() > bytes.len() {
            return Err(DeviceError::Runtime(format!(
                "write of {} bytes into a {}-byte allocation",
                src.len(),
                bytes.len()
            ))
            .into());
        }
        bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_from_device(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let state = self.state.lock().unwrap();
        let bytes = state.bytes(src.0)?;
        if dst.len() > bytes.len() {
            return Err(DeviceError::OutOfRange {
                requested: dst.len(),
                available: bytes.len(),
            }
            .into());
        }
        dst.copy_from_slice(&bytes[..dst.len()]);
        Ok(())
    }

    fn copy_to_device_2d(
        &self,
        dst: DevicePtr,
        dst_pitch: u64,
        src: &[u8],
        src_pitch: u64,
        width_bytes: u64,
        rows: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let bytes = state.bytes_mut(dst.0)?;
        for row in 0..rows {
            let src_offset = (row * src_pitch) as usize;
            let dst_offset = (row * dst_pitch) as usize;
            let width = width_bytes as usize;
            if src_offset + width > src.len() || dst_offset + width > bytes.len() {
                return Err(DeviceError::Runtime("2-D copy out of bounds".to_string()).into());
            }
            bytes[dst_offset..dst_offset + width]
                .copy_from_slice(&src[src_offset..src_offset + width]);
        }
        Ok(())
    }

    fn create_texture_object(&self, desc: &TextureObjectDesc) -> Result<TextureObjectId> {
        let mut state = self.state.lock().unwrap();
        if !state.allocations.contains_key(&desc.data.0) {
            return Err(DeviceError::InvalidPointer(desc.data.0).into());
        }
        let id = state.fresh_id();
        state.textures.insert(id, *desc);
        Ok(TextureObjectId(id))
    }

    fn destroy_texture_object(&self, object: TextureObjectId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .textures
            .remove(&object.0)
            .map(|_| ())
            .ok_or_else(|| DeviceError::Runtime(format!("unknown texture {object:?}")).into())
    }

    fn launch(
        &self,
        function: FunctionId,
        grid_dim: u32,
        block_dim: u32,
        args: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let (module, kind) = *state
            .functions
            .get(&function.0)
            .ok_or(DeviceError::Runtime(format!("unknown function {function:?}")))?;

        if args.len() != std::mem::size_of::<KernelArgs>() {
            return Err(DeviceError::Runtime(format!(
                "kernel argument struct has {} bytes, expected {}",
                args.len(),
                std::mem::size_of::<KernelArgs>()
            ))
            .into());
        }
        let args: KernelArgs = bytemuck::pod_read_unaligned(args);

        let params_ptr = state.modules[&module].constant_params;
        let params: ConstantParams = bytemuck::pod_read_unaligned(state.bytes(params_ptr.0)?);

        let thread_count = grid_dim as u64 * block_dim as u64;
        match kind {
            KernelKind::PathTracing => {
                exec::path_tracing(&mut state, &params, &args, thread_count)
            }
            KernelKind::PostProcessing => {
                exec::post_processing(&mut state, &params, &args, thread_count)
            }
        }
    }
}
