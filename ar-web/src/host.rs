//! Bridge from core events to page callbacks.

use ar_core::{HostNavigator, ScanEvent, ScanFeedback, ViewerEvent, ViewerObserver};
use js_sys::Function;
use serde::Serialize;
use wasm_bindgen::JsValue;
use web_sys::Window;

use crate::error::js_error_text;

/// Forwards scan and viewer events to page callbacks as JSON strings.
///
/// Delivery is deferred to a microtask so a callback may call straight back
/// into the experience without re-entering a borrowed session.
#[derive(Debug, Clone)]
pub struct PageBridge {
    window: Window,
    on_event: Function,
    on_return_home: Function,
}

impl PageBridge {
    /// Bridge calling `on_event(json)` for every event and `on_return_home()`
    /// when an AR session ends.
    #[must_use]
    pub fn new(window: Window, on_event: Function, on_return_home: Function) -> Self {
        Self {
            window,
            on_event,
            on_return_home,
        }
    }

    fn deliver(&self, event: &impl Serialize) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Event not serializable: {e}");
                return;
            }
        };
        let callback = self.on_event.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                tracing::warn!("Event callback threw: {}", js_error_text(&e));
            }
        });
    }

    fn vibrate(&self, duration_ms: u64) {
        let duration = u32::try_from(duration_ms).unwrap_or(u32::MAX);
        if !self.window.navigator().vibrate_with_duration(duration) {
            tracing::debug!("Vibration not supported");
        }
    }
}

impl ScanFeedback for PageBridge {
    fn on_event(&self, event: &ScanEvent) {
        if let ScanEvent::HapticPulse { duration_ms } = event {
            self.vibrate(*duration_ms);
        }
        self.deliver(event);
    }
}

impl ViewerObserver for PageBridge {
    fn on_event(&self, event: &ViewerEvent) {
        self.deliver(event);
    }
}

impl HostNavigator for PageBridge {
    fn return_to_home(&self) {
        tracing::info!("Returning to home screen");
        let callback = self.on_return_home.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = callback.call0(&JsValue::NULL) {
                tracing::warn!("Return-home callback threw: {}", js_error_text(&e));
            }
        });
    }
}
