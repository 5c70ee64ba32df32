//! Persistence of the last scan across the native AR hand-off.
//!
//! A [`KeyValueStorage`] backend is string-keyed with no transactions and a
//! capacity ceiling. [`SessionStore`] is the only writer of QR records and
//! always overwrites; when a write hits the ceiling it clears every entry and
//! retries once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::scan::{DecodedPayload, Quad};

/// Key of the payload and code location record.
pub const KEY_LOCATION: &str = "qrLocation";
/// Key of the captured photo data URI.
pub const KEY_PHOTO: &str = "qrPhoto";
/// Key of the capture timestamp.
pub const KEY_TIMESTAMP: &str = "qrTimestamp";
/// Key of the onboarding-seen flag.
pub const KEY_ONBOARDING_SEEN: &str = "ar-onboarding-seen";
/// Key of the AR-guide-shown flag.
pub const KEY_AR_GUIDE_SHOWN: &str = "ar_guide_shown";

/// String key-value persistence.
pub trait KeyValueStorage {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] when the backend is full.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory storage with an optional byte ceiling.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    /// Unbounded storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys plus values exceed `bytes`.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            entries: RwLock::default(),
            capacity: Some(bytes),
        }
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(capacity) = self.capacity {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > capacity {
                return Err(StorageError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// Directory-backed storage, one `<key>.value` file per entry.
#[derive(Debug, Clone)]
pub struct DirStorage {
    data_dir: PathBuf,
}

const VALUE_EXTENSION: &str = "value";

impl DirStorage {
    /// Open storage in `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// The backing directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{VALUE_EXTENSION}", sanitize_filename(key)))
    }
}

impl KeyValueStorage for DirStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == VALUE_EXTENSION) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Keep alphanumerics, `-` and `_`; replace everything else with `_`.
fn sanitize_filename(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The last scan, saved after a completed AR session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQrRecord {
    /// Decoded QR text.
    pub payload: String,
    /// Code location in the captured frame.
    pub frame_location: Quad,
    /// Capture time in milliseconds.
    pub captured_at_millis: u64,
    /// Captured frame as a data URI.
    pub photo: Option<String>,
}

impl From<DecodedPayload> for PersistedQrRecord {
    fn from(payload: DecodedPayload) -> Self {
        Self {
            payload: payload.raw_text,
            frame_location: payload.frame_location,
            captured_at_millis: payload.captured_at_millis,
            photo: payload.photo,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LocationEntry {
    payload: String,
    frame_location: Quad,
}

/// Reads and writes the persisted QR record.
#[derive(Clone)]
pub struct SessionStore {
    storage: Rc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Overwrite the stored record.
    ///
    /// A record without a photo is incomplete: any previous record is
    /// removed and nothing is written. On [`StorageError::QuotaExceeded`]
    /// every entry in the backend is cleared and the write retried once.
    /// A failed write never leaves a partial record behind.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the retry also fails.
    pub fn save(&self, record: &PersistedQrRecord) -> Result<(), StorageError> {
        let Some(photo) = record.photo.as_deref() else {
            tracing::debug!(payload = %record.payload, "Record has no photo, not persisting");
            return self.clear();
        };
        let result = match self.write_record(record, photo) {
            Err(StorageError::QuotaExceeded) => {
                tracing::warn!("Storage full, clearing all entries and retrying");
                self.storage.clear()?;
                self.write_record(record, photo)
            }
            other => other,
        };
        if result.is_err() {
            if let Err(e) = self.clear() {
                tracing::warn!("Failed to remove partial QR record: {e}");
            }
        }
        result
    }

    /// Read the stored record, if a complete one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend fails or the record is corrupt.
    pub fn load(&self) -> Result<Option<PersistedQrRecord>, StorageError> {
        let Some(location) = self.storage.get(KEY_LOCATION)? else {
            return Ok(None);
        };
        let Some(photo) = self.storage.get(KEY_PHOTO)? else {
            return Ok(None);
        };
        let location: LocationEntry = serde_json::from_str(&location)?;
        let captured_at_millis = self
            .storage
            .get(KEY_TIMESTAMP)?
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();
        Ok(Some(PersistedQrRecord {
            payload: location.payload,
            frame_location: location.frame_location,
            captured_at_millis,
            photo: Some(photo),
        }))
    }

    /// Read the stored record and delete it, so it is consumed once.
    ///
    /// # Errors
    ///
    /// As [`SessionStore::load`] and [`SessionStore::clear`].
    pub fn take(&self) -> Result<Option<PersistedQrRecord>, StorageError> {
        let record = self.load()?;
        if record.is_some() {
            self.clear()?;
        }
        Ok(record)
    }

    /// Delete the stored record, leaving other keys alone.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in [KEY_LOCATION, KEY_PHOTO, KEY_TIMESTAMP] {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    fn write_record(&self, record: &PersistedQrRecord, photo: &str) -> Result<(), StorageError> {
        let location = serde_json::to_string(&LocationEntry {
            payload: record.payload.clone(),
            frame_location: record.frame_location,
        })?;
        self.storage.set(KEY_PHOTO, photo)?;
        self.storage
            .set(KEY_TIMESTAMP, &record.captured_at_millis.to_string())?;
        self.storage.set(KEY_LOCATION, &location)
    }
}

/// First-run flags stored alongside the session record.
#[derive(Clone)]
pub struct ExperienceFlags {
    storage: Rc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for ExperienceFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperienceFlags").finish_non_exhaustive()
    }
}

impl ExperienceFlags {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Whether onboarding was completed.
    #[must_use]
    pub fn onboarding_seen(&self) -> bool {
        self.flag(KEY_ONBOARDING_SEEN)
    }

    /// Record that onboarding was completed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the flag cannot be written.
    pub fn mark_onboarding_seen(&self) -> Result<(), StorageError> {
        self.storage.set(KEY_ONBOARDING_SEEN, "true")
    }

    /// Whether the AR controls guide was shown before.
    #[must_use]
    pub fn ar_guide_shown(&self) -> bool {
        self.flag(KEY_AR_GUIDE_SHOWN)
    }

    /// Record that the AR controls guide was shown.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the flag cannot be written.
    pub fn mark_ar_guide_shown(&self) -> Result<(), StorageError> {
        self.storage.set(KEY_AR_GUIDE_SHOWN, "true")
    }

    /// Forget both flags.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the flags cannot be removed.
    pub fn reset(&self) -> Result<(), StorageError> {
        self.storage.remove(KEY_ONBOARDING_SEEN)?;
        self.storage.remove(KEY_AR_GUIDE_SHOWN)
    }

    fn flag(&self, key: &str) -> bool {
        match self.storage.get(key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!("Failed to read flag {key}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(photo_len: usize) -> PersistedQrRecord {
        PersistedQrRecord {
            payload: "MODEL_CHURCH_02".into(),
            frame_location: Quad::from_rect(1.0, 2.0, 30.0, 30.0),
            captured_at_millis: 1_700_000_000_000,
            photo: Some(format!("data:image/jpeg;base64,{}", "A".repeat(photo_len))),
        }
    }

    #[test]
    fn save_then_take_consumes_record() {
        let storage = Rc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        assert!(store.load().expect("load").is_none());

        store.save(&record(8)).expect("save");
        assert_eq!(store.take().expect("take"), Some(record(8)));
        assert!(store.take().expect("take again").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let store = SessionStore::new(Rc::new(MemoryStorage::new()));
        store.save(&record(8)).expect("first");
        let mut second = record(4);
        second.payload = "MODEL_CHURCH_03".into();
        store.save(&second).expect("second");
        assert_eq!(store.load().expect("load"), Some(second));
    }

    #[test]
    fn record_without_photo_is_never_stored() {
        let storage = Rc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.save(&record(8)).expect("first");

        let mut photoless = record(0);
        photoless.photo = None;
        store.save(&photoless).expect("save");
        assert!(store.load().expect("load").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn location_without_photo_does_not_load() {
        let storage = Rc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.save(&record(8)).expect("save");
        storage.remove(KEY_PHOTO).expect("remove photo");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn quota_clears_everything_and_retries_once() {
        let storage = Rc::new(MemoryStorage::with_capacity(450));
        storage.set("stale-cache", &"x".repeat(300)).expect("prefill");
        let store = SessionStore::new(storage.clone());

        store.save(&record(150)).expect("retry succeeds");
        assert!(storage.get("stale-cache").expect("get").is_none());
        assert_eq!(store.load().expect("load"), Some(record(150)));
    }

    #[test]
    fn quota_error_surfaces_when_record_never_fits() {
        let storage = Rc::new(MemoryStorage::with_capacity(300));
        let store = SessionStore::new(storage.clone());
        assert!(matches!(
            store.save(&record(1024)),
            Err(StorageError::QuotaExceeded)
        ));
        assert!(store.load().expect("load").is_none());
        assert!(storage.get(KEY_LOCATION).expect("get").is_none());
        assert!(storage.get(KEY_TIMESTAMP).expect("get").is_none());
        assert!(storage.is_empty());
    }

    /// Accepts everything except the location entry.
    #[derive(Default)]
    struct LocationRejecting(MemoryStorage);

    impl KeyValueStorage for LocationRejecting {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == KEY_LOCATION {
                return Err(StorageError::QuotaExceeded);
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key)
        }

        fn clear(&self) -> Result<(), StorageError> {
            self.0.clear()
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_record() {
        let storage = Rc::new(LocationRejecting::default());
        let store = SessionStore::new(storage.clone());
        assert!(store.save(&record(32)).is_err());
        assert!(storage.get(KEY_PHOTO).expect("get").is_none());
        assert!(storage.get(KEY_TIMESTAMP).expect("get").is_none());
        assert!(storage.0.is_empty());
    }

    #[test]
    fn dir_storage_persists_between_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = SessionStore::new(Rc::new(DirStorage::open(dir.path()).expect("open")));
            store.save(&record(16)).expect("save");
        }
        let storage = DirStorage::open(dir.path()).expect("reopen");
        let store = SessionStore::new(Rc::new(storage.clone()));
        assert_eq!(store.load().expect("load"), Some(record(16)));

        storage.clear().expect("clear");
        assert!(store.load().expect("load").is_none());
        storage.remove("never-written").expect("missing key is fine");
    }

    #[test]
    fn dir_storage_sanitizes_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DirStorage::open(dir.path()).expect("open");
        storage.set("../escape/key", "v").expect("set");
        assert!(dir.path().join("___escape_key.value").exists());
        assert_eq!(storage.get("../escape/key").expect("get").as_deref(), Some("v"));
    }

    #[test]
    fn flags_default_false_and_reset() {
        let storage: Rc<dyn KeyValueStorage> = Rc::new(MemoryStorage::new());
        let flags = ExperienceFlags::new(Rc::clone(&storage));
        assert!(!flags.onboarding_seen());
        flags.mark_onboarding_seen().expect("mark");
        flags.mark_ar_guide_shown().expect("mark");
        assert!(flags.onboarding_seen());
        assert!(flags.ar_guide_shown());

        SessionStore::new(Rc::clone(&storage)).clear().expect("clear record");
        assert!(flags.onboarding_seen());

        flags.reset().expect("reset");
        assert!(!flags.ar_guide_shown());
    }
}
