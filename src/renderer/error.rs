//! Error helpers for the GPU side of the renderer
//!
//! wgpu reports failures through callbacks and error scopes with their own
//! error types. These helpers fold them into `EngineError` with the name of
//! the operation that was running.

use crate::error::{EngineError, EngineResult};

pub type RendererResult<T> = EngineResult<T>;

/// Attach the failing operation to a foreign error
pub trait RendererErrorContext<T> {
    fn during(self, operation: &str) -> RendererResult<T>;
}

impl<T, E: std::fmt::Display> RendererErrorContext<T> for Result<T, E> {
    fn during(self, operation: &str) -> RendererResult<T> {
        self.map_err(|error| gpu_operation_error(operation, error))
    }
}

pub fn gpu_operation_error(operation: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::GpuOperationFailed {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_error_keeps_operation_name() {
        let mapped: Result<(), &str> = Err("device lost");
        let error = mapped.during("map staging buffer").unwrap_err();
        assert!(matches!(
            &error,
            EngineError::GpuOperationFailed { operation, error } if operation == "map staging buffer" && error == "device lost"
        ));
        assert!(!error.is_frame_local());
    }
}
