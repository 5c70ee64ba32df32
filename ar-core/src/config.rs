//! Tunables for scanning and the viewer session.
//!
//! Every field has a default so a JSON file only needs to name what it
//! overrides:
//!
//! ```json
//! { "scan": { "frame_skip": 2 }, "viewer": { "ar_launch_timeout_ms": 15000 } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogConfig, ModelCatalog};
use crate::error::ConfigError;

/// Which camera the stream is requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    /// Value for the `facingMode` media constraint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// Camera stream request. Width and height are ideal hints, not hard limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    /// Camera to use.
    pub facing_mode: FacingMode,
    /// Ideal frame width in pixels.
    pub ideal_width: u32,
    /// Ideal frame height in pixels.
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        // 640x480 decodes reliably while keeping CPU and battery cost low
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 640,
            ideal_height: 480,
        }
    }
}

/// Scan pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Decode on every Nth display frame.
    pub frame_skip: u32,
    /// Failed decode attempts before the retry tips appear.
    pub help_after_attempts: u32,
    /// Pause between a successful decode and the hand-off.
    pub success_feedback_ms: u64,
    /// Length of the haptic pulse on success.
    pub haptic_pulse_ms: u64,
    /// JPEG quality (1-100) of the captured frame.
    pub jpeg_quality: u8,
    /// Camera request.
    pub camera: CameraConstraints,
}

impl ScanConfig {
    /// Success feedback duration.
    #[must_use]
    pub const fn success_feedback(&self) -> Duration {
        Duration::from_millis(self.success_feedback_ms)
    }

    /// Haptic pulse duration.
    #[must_use]
    pub const fn haptic_pulse(&self) -> Duration {
        Duration::from_millis(self.haptic_pulse_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_skip == 0 {
            return Err(ConfigError::Invalid("scan.frame_skip must be at least 1".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "scan.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            frame_skip: 3,
            help_after_attempts: 60,
            success_feedback_ms: 1000,
            haptic_pulse_ms: 200,
            jpeg_quality: 90,
            camera: CameraConstraints::default(),
        }
    }
}

/// Viewer session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// How long an AR launch waits for the model to finish loading.
    pub ar_launch_timeout_ms: u64,
    /// How long the AR controls guide stays up after a scan.
    pub guide_duration_ms: u64,
}

impl ViewerConfig {
    /// AR launch timeout.
    #[must_use]
    pub const fn ar_launch_timeout(&self) -> Duration {
        Duration::from_millis(self.ar_launch_timeout_ms)
    }

    /// Guide overlay duration.
    #[must_use]
    pub const fn guide_duration(&self) -> Duration {
        Duration::from_millis(self.guide_duration_ms)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            ar_launch_timeout_ms: 10_000,
            guide_duration_ms: 3_000,
        }
    }
}

/// Complete experience configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceConfig {
    /// Scan pipeline settings.
    pub scan: ScanConfig,
    /// Viewer session settings.
    pub viewer: ViewerConfig,
    /// Replacement catalog; the built-in church catalog when absent.
    pub catalog: Option<CatalogConfig>,
}

impl ExperienceConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.scan.validate()?;
        if let Some(catalog) = &config.catalog {
            ModelCatalog::from_config(catalog.clone())?;
        }
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`ExperienceConfig::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_json(&contents)
    }

    /// Build the catalog this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configured catalog is inconsistent.
    pub fn build_catalog(&self) -> Result<ModelCatalog, ConfigError> {
        self.catalog
            .clone()
            .map_or_else(|| Ok(ModelCatalog::builtin()), ModelCatalog::from_config)
    }
}
