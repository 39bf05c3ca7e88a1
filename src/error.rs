//! Engine error type.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced to callers
///
/// Most failures (missing assets, shader compile errors, exhausted slot caps)
/// are logged and degrade in place. Only contract violations and explicit
/// load/save requests reach the caller through this type.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("write of {requested} bytes overflows {buffer} (capacity {capacity})")]
    BufferOverflow {
        buffer: &'static str,
        requested: usize,
        capacity: usize,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::BufferOverflow {
            buffer: "uniform buffer",
            requested: 272,
            capacity: 256,
        };
        assert_eq!(
            err.to_string(),
            "write of 272 bytes overflows uniform buffer (capacity 256)"
        );

        let err: EngineError = BackendError::ProgramLinkFailed("bad varyings".into()).into();
        assert_eq!(err.to_string(), "Failed to link program: bad varyings");
    }
}
