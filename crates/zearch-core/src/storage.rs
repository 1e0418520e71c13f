//! Persistence backend for the settings store
//!
//! The extension keeps one JSON object under a fixed key in synced storage,
//! with last-write-wins semantics and no conflict detection. The store reads
//! and writes whole objects only; the [`SettingsBackend`] trait mirrors that
//! contract so the engine can run against extension storage, a file, or
//! memory without caring which.

use serde_json::Value;
use thiserror::Error;

/// Storage key the settings object lives under.
pub const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    Read(String),
    #[error("storage write failed: {0}")]
    Write(String),
}

/// One JSON object under a fixed key, read and written whole.
pub trait SettingsBackend {
    /// Read the persisted object, or `None` when nothing has been saved yet.
    fn read(&self) -> Result<Option<Value>, StorageError>;

    /// Overwrite the persisted object.
    fn write(&mut self, value: &Value) -> Result<(), StorageError>;
}

/// In-process backend for tests and the wasm bridge.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    value: Option<Value>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with an already-persisted object (e.g. handed over from
    /// extension storage at startup).
    pub fn with_value(value: Value) -> Self {
        Self { value: Some(value) }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl SettingsBackend for MemoryBackend {
    fn read(&self) -> Result<Option<Value>, StorageError> {
        Ok(self.value.clone())
    }

    fn write(&mut self, value: &Value) -> Result<(), StorageError> {
        self.value = Some(value.clone());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_backend_round_trip() {
        let mut backend = MemoryBackend::new();
        assert!(backend.read().unwrap().is_none());

        let value = json!({"isEnabled": true});
        backend.write(&value).unwrap();
        assert_eq!(backend.read().unwrap(), Some(value));
    }
}
