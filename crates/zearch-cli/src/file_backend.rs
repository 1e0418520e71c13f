//! File-based settings backend
//!
//! Stores the same settings object the extension keeps in synced storage,
//! pretty-printed so the file is hand-editable.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use zearch_core::storage::{SettingsBackend, StorageError};

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsBackend for FileBackend {
    fn read(&self) -> Result<Option<Value>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::Read(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };
        let value = serde_json::from_str(&text)
            .map_err(|err| StorageError::Read(format!("{}: {err}", self.path.display())))?;
        Ok(Some(value))
    }

    fn write(&mut self, value: &Value) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|err| StorageError::Write(err.to_string()))?;
        fs::write(&self.path, text)
            .map_err(|err| StorageError::Write(format!("{}: {err}", self.path.display())))
    }
}
