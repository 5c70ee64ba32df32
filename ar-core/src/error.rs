//! Error types for the scan-to-AR flow.

use thiserror::Error;

/// Result type for fallible AR-core operations.
pub type ArResult<T> = Result<T, ArError>;

/// Why the camera stream could not be acquired.
///
/// Terminal for the current scan attempt. `PermissionDenied` sends the user
/// back to the permission explanation instead of retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The user or browser policy refused camera access.
    #[error("Camera permission denied")]
    PermissionDenied,
    /// No usable camera, or it is held by another process.
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// Anything else the platform reported.
    #[error("Camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Map a DOM exception name (`NotAllowedError`, ...) to a camera error.
    #[must_use]
    pub fn from_dom_name(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" | "NotReadableError" | "TrackStartError"
            | "OverconstrainedError" => Self::DeviceUnavailable(message.to_string()),
            _ => Self::Other(format!("{name}: {message}")),
        }
    }

    /// Whether the user should be routed back to the permission screen.
    #[must_use]
    pub const fn needs_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// The viewer failed to load a model asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load model {key}: {message}")]
pub struct ModelLoadError {
    /// Catalog key of the model that failed.
    pub key: String,
    /// Message reported by the viewer.
    pub message: String,
}

/// Activating the native AR viewer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArActivationError {
    /// The model did not finish loading within the launch timeout.
    #[error("Timed out waiting for the model to load")]
    Timeout,
    /// The viewer rejected the activation request.
    #[error("AR activation failed: {0}")]
    ActivationFailed(String),
}

/// Errors raised by key-value persistence backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend is at its capacity ceiling.
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    /// The backend is missing or disabled (private mode, no directory, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// A filesystem error from a directory-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while encoding or decoding captured frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Pixel buffer length does not match its dimensions.
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
    /// JPEG encoding failed.
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
    /// A data URI was malformed.
    #[error("Invalid data URI: {0}")]
    DataUri(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed but is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum ArError {
    /// Camera acquisition failed.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// Model loading failed.
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    /// AR activation failed.
    #[error(transparent)]
    Activation(#[from] ArActivationError),
    /// The platform has no AR runtime (ARCore missing on Android).
    #[error("AR is not supported on this device")]
    ArCoreUnavailable,
    /// Persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Frame capture failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// Configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
