//! Engine-wide error taxonomy

use thiserror::Error;

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A per-frame buffer would overflow its preallocated size.
    /// The overflowing writes were dropped and the affected draw clamped.
    #[error("Capacity exceeded for {buffer}: requested {requested} entries, capacity {capacity}")]
    CapacityExceeded {
        buffer: String,
        capacity: u64,
        requested: u64,
    },

    #[error("Degenerate input in {what}: {reason}")]
    DegenerateInput { what: String, reason: String },

    #[error("Failed to create resource {resource}: {reason}")]
    ResourceCreationFailure { resource: String, reason: String },

    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    #[error("Pass '{pass}' violates the frame schedule on {resource}: {reason}")]
    ScheduleViolation {
        pass: String,
        resource: String,
        reason: String,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error aborts only the current frame, leaving the renderer usable
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            EngineError::CapacityExceeded { .. } | EngineError::DegenerateInput { .. }
        )
    }

    pub fn capacity(buffer: &str, capacity: u64, requested: u64) -> Self {
        EngineError::CapacityExceeded {
            buffer: buffer.to_string(),
            capacity,
            requested,
        }
    }

    pub fn degenerate(what: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::DegenerateInput {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn resource(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::ResourceCreationFailure {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::Config {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(error: toml::ser::Error) -> Self {
        EngineError::Config {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_message() {
        let err = EngineError::capacity("meshlet instances", 16, 20);
        assert_eq!(
            err.to_string(),
            "Capacity exceeded for meshlet instances: requested 20 entries, capacity 16"
        );
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_resource_failure_is_not_frame_local() {
        let err = EngineError::resource("Hi-Z pyramid", "zero extent");
        assert!(!err.is_frame_local());
    }
}
