//! Errors raised while wiring browser objects to the core.

use ar_core::{ConfigError, StorageError};
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Result type for browser host setup.
pub type WebResult<T> = Result<T, WebError>;

/// Failures of the browser host itself.
#[derive(Debug, Error)]
pub enum WebError {
    /// Not running in a window context.
    #[error("No window object")]
    NoWindow,
    /// The window has no document.
    #[error("No document object")]
    NoDocument,
    /// A required element is missing from the page.
    #[error("Element '{0}' not found")]
    ElementNotFound(String),
    /// A DOM call threw.
    #[error("JavaScript error: {0}")]
    Js(String),
    /// The experience configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Persistence failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<JsValue> for WebError {
    fn from(value: JsValue) -> Self {
        Self::Js(js_error_text(&value))
    }
}

impl From<WebError> for JsValue {
    fn from(err: WebError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Best-effort text for a thrown JS value.
///
/// Prefers `name: message` for `Error`/`DOMException` objects, then plain
/// strings, then the debug form.
#[must_use]
pub fn js_error_text(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    let name = js_error_name(value);
    let message = js_sys::Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_default();
    match (name.is_empty(), message.is_empty()) {
        (false, false) => format!("{name}: {message}"),
        (true, false) => message,
        (false, true) => name,
        (true, true) => format!("{value:?}"),
    }
}

/// The `name` property of a thrown JS value, or an empty string.
#[must_use]
pub fn js_error_name(value: &JsValue) -> String {
    js_sys::Reflect::get(value, &JsValue::from_str("name"))
        .ok()
        .and_then(|n| n.as_string())
        .unwrap_or_default()
}

/// The `message` property of a thrown JS value, or an empty string.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    js_sys::Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_default()
}
