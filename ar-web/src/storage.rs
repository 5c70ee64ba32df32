//! `window.localStorage` as a [`KeyValueStorage`].

use ar_core::{KeyValueStorage, StorageError};
use wasm_bindgen::JsValue;
use web_sys::{Storage, Window};

use crate::error::{js_error_name, js_error_text};

/// Browser local storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    storage: Storage,
}

impl LocalStorage {
    /// Open the window's local storage.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when storage is disabled, which
    /// some browsers do in private mode.
    pub fn open(window: &Window) -> Result<Self, StorageError> {
        match window.local_storage() {
            Ok(Some(storage)) => Ok(Self { storage }),
            Ok(None) => Err(StorageError::Unavailable(
                "localStorage is not available".to_string(),
            )),
            Err(e) => Err(StorageError::Unavailable(js_error_text(&e))),
        }
    }
}

/// Map a thrown storage exception, recognizing every browser's quota error.
fn map_error(err: &JsValue) -> StorageError {
    match js_error_name(err).as_str() {
        "QuotaExceededError" | "NS_ERROR_DOM_QUOTA_REACHED" => StorageError::QuotaExceeded,
        _ => StorageError::Unavailable(js_error_text(err)),
    }
}

impl KeyValueStorage for LocalStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage.get_item(key).map_err(|e| map_error(&e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage.set_item(key, value).map_err(|e| map_error(&e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove_item(key).map_err(|e| map_error(&e))
    }

    fn clear(&self) -> Result<(), StorageError> {
        tracing::warn!("Clearing all local storage entries");
        self.storage.clear().map_err(|e| map_error(&e))
    }
}
