//! # AR Launch Core
//!
//! Host-agnostic logic for scanning a QR code and launching the platform's
//! native AR viewer on the model it names.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                     ar-core                           │
//! ├───────────────────────────────────────────────────────┤
//! │  ScanPipeline          │  ModelResolver               │
//! │  - Camera stream       │  - Exact key / URL params    │
//! │  - Throttled decode    │  - Numeric aliases           │
//! │  - Found / retry help  │  - Substring, default        │
//! ├───────────────────────────────────────────────────────┤
//! │  ViewerSession         │  SessionStore                │
//! │  - Platform asset only │  - QR record across AR       │
//! │  - Native AR hand-off  │  - Quota clear-and-retry     │
//! ├───────────────────────────────────────────────────────┤
//! │  PlatformFacts  │  ModelCatalog  │  ExperienceConfig  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows camera → [`ScanPipeline`] → [`ModelResolver`] →
//! [`ViewerSession`] → native AR, and on return the session writes the
//! scan through [`SessionStore`] and hands control back to the host.
//! Browser and CLI hosts provide the capability traits ([`Camera`],
//! [`QrDecoder`], [`FrameClock`], [`ModelViewerElement`],
//! [`KeyValueStorage`], [`HostNavigator`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod platform;
pub mod resolver;
pub mod scan;
pub mod store;
pub mod viewer;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use capture::{decode_data_uri, FrameBuffer};
pub use catalog::{CatalogConfig, ModelCatalog, ModelDescriptor, Vec3};
pub use config::{CameraConstraints, ExperienceConfig, FacingMode, ScanConfig, ViewerConfig};
pub use error::{
    ArActivationError, ArError, ArResult, CameraError, CaptureError, ConfigError, ModelLoadError,
    StorageError,
};
pub use event::{ScanEvent, ViewerEvent};
pub use platform::{ArViewer, PlatformFacts};
pub use resolver::{MatchKind, ModelResolver, Resolution};
pub use scan::{
    Camera, CameraStream, DecodedPayload, FrameClock, Inversion, LogFeedback, Point, QrDecoder,
    QrMatch, Quad, ScanFeedback, ScanPipeline, ScanState,
};
pub use store::{
    DirStorage, ExperienceFlags, KeyValueStorage, MemoryStorage, PersistedQrRecord, SessionStore,
};
pub use viewer::{
    is_ar_unavailable_error, ArStatus, HostNavigator, LogObserver, ModelViewerElement,
    SourceLoad, ViewerObserver, ViewerSession, ViewerState,
};

/// AR launch core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
