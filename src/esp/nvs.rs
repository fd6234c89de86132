use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::error;

use crate::constants::NVS_NAMESPACE;
use crate::error::StoreError;
use crate::store::BlobStore;

/// The configuration namespace in the default NVS partition.
pub struct NvsBlobStore {
    nvs: Option<EspNvs<NvsDefault>>,
}

impl NvsBlobStore {
    /// Opens the namespace read-write. A failure leaves the store unavailable, which
    /// sends the boot to provisioning rather than aborting it.
    pub fn open(partition: EspDefaultNvsPartition) -> Self {
        let nvs = match EspNvs::new(partition, NVS_NAMESPACE, true) {
            Ok(nvs) => Some(nvs),
            Err(e) => {
                error!("Failed to open NVS namespace {}: {:?}", NVS_NAMESPACE, e);
                None
            }
        };
        Self { nvs }
    }
}

impl BlobStore for NvsBlobStore {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        let nvs = self
            .nvs
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable(NVS_NAMESPACE.to_string()))?;
        let len = match nvs.blob_len(key) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Unavailable(format!("{:?}", e))),
        };
        if len != buf.len() {
            return Ok(Some(len));
        }
        match nvs.get_blob(key, buf) {
            Ok(Some(data)) => Ok(Some(data.len())),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!("{:?}", e))),
        }
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let nvs = self
            .nvs
            .as_mut()
            .ok_or_else(|| StoreError::WriteFailed(NVS_NAMESPACE.to_string()))?;
        // set_blob commits before returning
        nvs.set_blob(key, data)
            .map_err(|e| StoreError::WriteFailed(format!("{:?}", e)))
    }
}
