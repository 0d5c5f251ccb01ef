//! Unified error handling for the reveal pipeline.
//!
//! None of these errors is fatal. Callers log them and degrade to
//! "no-op this cycle, try again on the next event".

use thiserror::Error;

/// Unified error type for fogcore and the sampler built on it.
#[derive(Debug, Clone, Error)]
pub enum FogError {
    /// Store read/write failed; in-memory state stays authoritative
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Position access refused by the user or the OS
    #[error("Location permission denied ({scope})")]
    PermissionDenied { scope: String },

    /// Transport delivered a payload that does not decode
    #[error("Malformed message: {message}")]
    MalformedMessage { message: String },

    /// Viewport provider not registered or not yet initialized
    #[error("Projection unavailable")]
    ProjectionUnavailable,

    /// Transport refused to carry a message
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Location service failure other than a permission refusal
    #[error("Location service error: {message}")]
    Location { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Image encoding failed
    #[error("Encoding error: {message}")]
    Encode { message: String },
}

impl From<serde_json::Error> for FogError {
    fn from(err: serde_json::Error) -> Self {
        FogError::MalformedMessage {
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for FogError {
    fn from(err: image::ImageError) -> Self {
        FogError::Encode {
            message: err.to_string(),
        }
    }
}

/// Result type alias for fogcore operations.
pub type Result<T> = std::result::Result<T, FogError>;

/// Extension trait for converting Option to FogError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a projection-unavailable error.
    fn ok_or_projection_unavailable(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_projection_unavailable(self) -> Result<T> {
        self.ok_or(FogError::ProjectionUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FogError::PermissionDenied {
            scope: "foreground".to_string(),
        };
        assert!(err.to_string().contains("foreground"));

        let err: FogError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, FogError::MalformedMessage { .. }));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_projection_unavailable(),
            Err(FogError::ProjectionUnavailable)
        ));
        assert_eq!(Some(3).ok_or_projection_unavailable().unwrap(), 3);
    }
}
