//! Events emitted to the presentation layer.
//!
//! Both the scan pipeline and the viewer session are UI-agnostic: they emit
//! these events and a host renders them however it likes.

use serde::{Deserialize, Serialize};

use crate::scan::ScanState;
use crate::viewer::ViewerState;

/// Progress of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// The pipeline moved to a new state.
    StateChanged {
        /// New state.
        state: ScanState,
    },
    /// Enough attempts have failed that scan tips should be shown.
    RetryHelp {
        /// Failed attempts so far.
        attempts: u32,
    },
    /// Request a vibration of the given length.
    HapticPulse {
        /// Pulse length in milliseconds.
        duration_ms: u64,
    },
    /// A code was decoded; show the success checkmark.
    Success {
        /// Decoded text.
        text: String,
    },
}

/// Changes in the viewer session the presentation layer should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerEvent {
    /// The session moved to a new state.
    StateChanged {
        /// New state.
        state: ViewerState,
    },
    /// Show or hide the blocking loading indicator.
    Loading {
        /// Whether the indicator is visible.
        visible: bool,
    },
    /// The requested model finished loading.
    ModelLoaded {
        /// Catalog key.
        key: String,
    },
    /// A model failed to load; the previous one was re-applied if there was one.
    ModelLoadFailed {
        /// Catalog key of the failed model.
        key: String,
        /// Message from the viewer.
        message: String,
    },
    /// Brief toast naming the scanned model.
    ModelToast {
        /// Model display name.
        display_name: String,
        /// Model description.
        description: String,
    },
    /// Show the AR controls guide.
    GuideShown {
        /// Platform-specific guide image, if any.
        image: Option<String>,
    },
    /// Hide the AR controls guide.
    GuideHidden,
    /// Native AR is being launched; hide in-page controls.
    ArLaunching,
    /// The launch was abandoned and in-page controls are restored.
    ArLaunchFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// The native AR viewer took over.
    ArStarted,
    /// The native AR viewer returned control to the page.
    ArEnded,
    /// Blocking notice: this device cannot run native AR.
    ArUnsupported,
    /// The unsupported notice was dismissed.
    NoticeDismissed,
}
