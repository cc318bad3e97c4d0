use {
    crate::{
        device::{Device, DevicePtr, ModuleId},
        error::DeviceError,
    },
    anyhow::Result,
    bytemuck::{Pod, Zeroable},
    std::{marker::PhantomData, sync::Arc},
};

/// The `{pointer, length}` pair a kernel receives for each device array.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct RawArray {
    pub dptr: u64,
    pub len: u32,
    pub _padding: u32,
}

/// A typed linear device allocation. Frees its memory on drop; moving is
/// fine, copying is not.
#[derive(Debug)]
pub struct Array<T> {
    device: Arc<dyn Device>,
    dptr: DevicePtr,
    len: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> Array<T> {
    pub fn new(device: &Arc<dyn Device>, len: usize) -> Result<Self> {
        let dptr = device.malloc((len * std::mem::size_of::<T>()) as u64)?;
        Ok(Self {
            device: device.clone(),
            dptr,
            len: len as u32,
            _marker: PhantomData,
        })
    }

    pub fn from_slice(device: &Arc<dyn Device>, data: &[T]) -> Result<Self> {
        let array = Self::new(device, data.len())?;
        array.device.copy_to_device(array.dptr, bytemuck::cast_slice(data))?;
        Ok(array)
    }

    pub fn dptr(&self) -> DevicePtr { self.dptr }

    pub fn len(&self) -> usize { self.len as usize }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn size_in_bytes(&self) -> usize { self.len as usize * std::mem::size_of::<T>() }

    pub fn raw(&self) -> RawArray {
        RawArray {
            dptr: self.dptr.0,
            len: self.len,
            _padding: 0,
        }
    }

    /// Reads `dst.len()` bytes from the front of the allocation; shorter
    /// reads truncate, longer ones fail with [`DeviceError::OutOfRange`].
    pub fn read_bytes(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.size_in_bytes() {
            return Err(DeviceError::OutOfRange {
                requested: dst.len(),
                available: self.size_in_bytes(),
            }
            .into());
        }
        self.device.copy_from_device(dst, self.dptr)
    }

    pub fn fill_zero(&self) -> Result<()> {
        self.device.copy_to_device(self.dptr, &vec![0u8; self.size_in_bytes()])
    }
}

impl<T> Drop for Array<T> {
    fn drop(&mut self) {
        if let Err(e) = self.device.free(self.dptr) {
            log::error!("Failed to free {:?}: {e}", self.dptr);
        }
    }
}

/// A named global exposed by a kernel module. Binding verifies the symbol's
/// size; the module owns the memory, so dropping does nothing.
#[derive(Debug)]
pub struct Global<T> {
    device: Arc<dyn Device>,
    dptr: DevicePtr,
    _marker: PhantomData<T>,
}

impl<T: Pod> Global<T> {
    pub fn bind(device: &Arc<dyn Device>, module: ModuleId, name: &str) -> Result<Self> {
        let (dptr, size) = device.get_global(module, name)?;
        let expected = std::mem::size_of::<T>() as u64;
        if size != expected {
            return Err(DeviceError::GlobalSizeMismatch {
                name: name.to_string(),
                expected,
                actual: size,
            }
            .into());
        }

        Ok(Self {
            device: device.clone(),
            dptr,
            _marker: PhantomData,
        })
    }

    pub fn write(&self, value: &T) -> Result<()> {
        self.device.copy_to_device(self.dptr, bytemuck::bytes_of(value))
    }
}
