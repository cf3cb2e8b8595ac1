//! Dual-area key/value storage for auth records.
//!
//! Exactly one area is active per configuration:
//! - [`StorageArea::Persistent`] survives restarts, one file per key under a
//!   root directory.
//! - [`StorageArea::Session`] lives in process memory and dies with it.
//!
//! Removal always targets both areas, so records written under a previous
//! storage configuration cannot linger after the configuration changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Directory name under the platform data dir that holds persistent records.
const STORAGE_DIR: &str = "lanyard";

/// Storage area selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    /// Survives application restarts.
    #[default]
    Persistent,
    /// Scoped to this process; cleared when it exits.
    Session,
}

/// Default persistent-area root for an application.
pub fn default_root(app_id: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STORAGE_DIR)
        .join(app_id)
}

/// String-per-key storage with a persistent and a session-scoped area.
pub struct AuthStorage {
    active: StorageArea,
    root: PathBuf,
    session: Mutex<HashMap<String, String>>,
}

impl AuthStorage {
    pub fn new(active: StorageArea, root: PathBuf) -> Self {
        Self {
            active,
            root,
            session: Mutex::new(HashMap::new()),
        }
    }

    /// Area writes and reads go to.
    pub fn active_area(&self) -> StorageArea {
        self.active
    }

    /// Read a key from the active area.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.active {
            StorageArea::Persistent => match std::fs::read_to_string(self.file_path(key)) {
                Ok(value) => Some(value),
                Err(error) => {
                    if error.kind() != std::io::ErrorKind::NotFound {
                        debug!(key, error = %error, "failed to read stored value");
                    }
                    None
                }
            },
            StorageArea::Session => self.session_map().get(key).cloned(),
        }
    }

    /// Write a key to the active area.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.active {
            StorageArea::Persistent => {
                std::fs::create_dir_all(&self.root)
                    .with_context(|| format!("failed to create storage dir: {}", self.root.display()))?;
                std::fs::write(self.file_path(key), value)
                    .with_context(|| format!("failed to write stored value: {key}"))?;
            }
            StorageArea::Session => {
                self.session_map().insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Remove a key from BOTH areas, regardless of which one is active.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.session_map().remove(key);

        let path = self.file_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to remove stored value: {key}"))
            }
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn session_map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
