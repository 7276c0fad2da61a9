// NVS-backed storage region
// The whole region is kept in a RAM cache and written back as one blob on
// commit, the way EEPROM emulation behaves on flash.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::EspError;
use log::{info, warn};

use crate::storage::{check_bounds, Storage, StorageError};

const NVS_NAMESPACE: &str = "bridge_cfg";
const CONFIG_BLOB_KEY: &str = "config";
pub const REGION_SIZE: usize = 512;

pub struct NvsStorage {
    nvs: EspNvs<NvsDefault>,
    cache: [u8; REGION_SIZE],
}

impl NvsStorage {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        info!("✅ NVS storage opened (namespace '{}')", NVS_NAMESPACE);

        // Never-written flash reads as 0xFF, which fails the signature check
        let mut cache = [0xFF; REGION_SIZE];
        let mut blob = [0u8; REGION_SIZE];
        match nvs.get_raw(CONFIG_BLOB_KEY, &mut blob) {
            Ok(Some(data)) => {
                let len = data.len().min(REGION_SIZE);
                cache[..len].copy_from_slice(&data[..len]);
                info!("📂 Loaded {} byte configuration blob", len);
            }
            Ok(None) => info!("📭 No configuration blob stored yet"),
            Err(e) => warn!("⚠️ Configuration blob unreadable ({:?}) - starting blank", e),
        }

        Ok(Self { nvs, cache })
    }
}

impl Storage for NvsStorage {
    fn capacity(&self) -> usize {
        REGION_SIZE
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), REGION_SIZE)?;
        buf.copy_from_slice(&self.cache[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), REGION_SIZE)?;
        self.cache[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.nvs
            .set_raw(CONFIG_BLOB_KEY, &self.cache)
            .map(|_| info!("💾 Configuration blob written to NVS"))
            .map_err(|e| StorageError::CommitFailed(format!("{:?}", e)))
    }
}
