use thiserror::Error;

/// Failures of the device runtime or of the module binding contract. All of
/// these are fatal; nothing in the renderer retries.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("module symbol '{name}' not found")]
    MissingSymbol { name: String },

    #[error("global '{name}' has size {actual}, expected {expected}")]
    GlobalSizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid device pointer {0:#x}")]
    InvalidPointer(u64),

    #[error("read of {requested} bytes exceeds the {available} available")]
    OutOfRange { requested: usize, available: usize },

    #[error("device runtime error: {0}")]
    Runtime(String),
}
