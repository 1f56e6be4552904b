//! Object storage boundary, keyed by (tenant, path).
//!
//! The store only ever sees opaque bytes; which backend holds them is
//! the caller's choice at wiring time.

use crate::error::{RiskError, RiskResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub trait ObjectStorage: Send {
    fn put(&self, tenant: &str, path: &str, bytes: &[u8]) -> RiskResult<()>;
    fn get(&self, tenant: &str, path: &str) -> RiskResult<Vec<u8>>;
}

/// In-memory storage used by tests and the demo runner.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStorage for MemoryStorage {
    fn put(&self, tenant: &str, path: &str, bytes: &[u8]) -> RiskResult<()> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert((tenant.to_string(), path.to_string()), bytes.to_vec());
        Ok(())
    }

    fn get(&self, tenant: &str, path: &str) -> RiskResult<Vec<u8>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(&(tenant.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| RiskError::not_found("object", tenant, path))
    }
}

/// Directory-backed storage: objects live under `root/<tenant>/<path>`.
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, tenant: &str, path: &str) -> PathBuf {
        self.root.join(tenant).join(path)
    }
}

impl ObjectStorage for DirStorage {
    fn put(&self, tenant: &str, path: &str, bytes: &[u8]) -> RiskResult<()> {
        let full = self.object_path(tenant, path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)?;
        Ok(())
    }

    fn get(&self, tenant: &str, path: &str) -> RiskResult<Vec<u8>> {
        let full = self.object_path(tenant, path);
        match std::fs::read(full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RiskError::not_found("object", tenant, path))
            }
            Err(e) => Err(e.into()),
        }
    }
}
