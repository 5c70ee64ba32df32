//! # AR Launch Web Host
//!
//! Browser adapters for the scan-to-AR flow in `ar-core`: camera capture via
//! `getUserMedia`, the page's `jsQR` decoder, the `<model-viewer>` element,
//! page visibility and `localStorage`.
//!
//! ## Usage
//!
//! Build for WASM:
//! ```bash
//! wasm-pack build --target web ar-web
//! ```
//!
//! Then import in JavaScript:
//! ```javascript
//! import init, { WebExperience } from './pkg/ar_web.js';
//!
//! await init();
//! const experience = new WebExperience(
//!     'ar-viewer',
//!     null,
//!     (json) => render(JSON.parse(json)),
//!     () => { location.href = '/'; },
//! );
//! experience.initialize(null);
//! await experience.startScan();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod camera;
pub mod clock;
pub mod decoder;
pub mod error;
pub mod experience;
pub mod host;
pub mod listener;
pub mod storage;
pub mod viewer;

pub use camera::{WebCamera, WebCameraStream};
pub use clock::AnimationFrameClock;
pub use decoder::JsQrDecoder;
pub use error::{WebError, WebResult};
pub use experience::WebExperience;
pub use host::PageBridge;
pub use storage::LocalStorage;
pub use viewer::ModelViewer;

use wasm_bindgen::prelude::*;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init_wasm() {
    console_error_panic_hook::set_once();
    tracing::info!("AR launch web host initialized (core {})", ar_core::VERSION);
}
