//! Configuration store: one cached record, persisted as a single blob.
//!
//! Every `save` is an immediate durable overwrite; the cache is only updated once the
//! backend accepted the write, so `get` never reports something storage does not hold.

use std::collections::HashMap;

use log::{error, info, warn};

use crate::constants::NVS_RECORD_KEY;
use crate::error::StoreError;
use crate::record::{ConfigurationRecord, RECORD_LEN};

/// Namespaced key/value blob storage (NVS on the device).
pub trait BlobStore {
    /// Reads `key` into `buf`, returning the stored length. A stored length that differs
    /// from `buf.len()` is still reported so the caller can detect a layout change.
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError>;

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
}

pub struct ConfigStore<B> {
    backend: B,
    cached: Option<ConfigurationRecord>,
}

impl<B: BlobStore> ConfigStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cached: None,
        }
    }

    /// Loads the persisted record, falling back to (and persisting) defaults when the
    /// blob is missing or malformed.
    pub fn load(&mut self) -> ConfigurationRecord {
        let mut buf = [0u8; RECORD_LEN];
        let stored = match self.backend.read(NVS_RECORD_KEY, &mut buf) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Config storage unavailable: {}", e);
                self.cached = None;
                return ConfigurationRecord::default();
            }
        };

        let record = match stored {
            Some(len) if len == RECORD_LEN => match ConfigurationRecord::decode(&buf) {
                Ok(record) => {
                    info!("Config loaded, sleep interval {} min", record.sleep_interval);
                    Some(record)
                }
                Err(e) => {
                    warn!("Stored config malformed ({}), using defaults", e);
                    None
                }
            },
            Some(len) => {
                warn!("Stored config is {} bytes, expected {}, using defaults", len, RECORD_LEN);
                None
            }
            None => {
                info!("No stored config, using defaults");
                None
            }
        };

        match record {
            Some(record) => {
                self.cached = Some(record.clone());
                record
            }
            None => {
                let defaults = ConfigurationRecord::default();
                if let Err(e) = self.save(&defaults) {
                    error!("Failed to persist default config: {}", e);
                }
                // Defaults are usable even when they could not be written back.
                self.cached = Some(defaults.clone());
                defaults
            }
        }
    }

    /// Whether a record is loaded; false only when storage itself was unreachable.
    pub fn is_valid(&self) -> bool {
        self.cached.is_some()
    }

    /// Copy of the cached record (defaults before the first successful load).
    pub fn get(&self) -> ConfigurationRecord {
        self.cached.clone().unwrap_or_default()
    }

    /// Overwrites the stored blob and the cache with `record`.
    pub fn save(&mut self, record: &ConfigurationRecord) -> Result<(), StoreError> {
        self.backend.write(NVS_RECORD_KEY, &record.encode())?;
        self.cached = Some(record.clone());
        Ok(())
    }

    /// Single load-modify-save against the currently cached record.
    pub fn modify<F>(&mut self, f: F) -> Result<ConfigurationRecord, StoreError>
    where
        F: FnOnce(&mut ConfigurationRecord),
    {
        let mut record = self.get();
        f(&mut record);
        self.save(&record)?;
        Ok(record)
    }
}

/// Heap-backed blob store for host runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
    writes: usize,
    offline: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every access fails, like an NVS partition that could not be opened.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn blob(&self, key: &str) -> Option<&[u8]> {
        self.blobs.get(key).map(Vec::as_slice)
    }

    /// Stores `data` under `key` without counting it as a write.
    pub fn insert_blob(&mut self, key: &str, data: Vec<u8>) {
        self.blobs.insert(key.to_string(), data);
    }

    /// Number of accepted `write` calls.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(self.blobs.get(key).map(|blob| {
            let n = blob.len().min(buf.len());
            buf[..n].copy_from_slice(&blob[..n]);
            blob.len()
        }))
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::WriteFailed("memory store offline".to_string()));
        }
        self.blobs.insert(key.to_string(), data.to_vec());
        self.writes += 1;
        Ok(())
    }
}

impl<B: BlobStore + ?Sized> BlobStore for &mut B {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        (**self).read(key, buf)
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write(key, data)
    }
}
