#[cfg(feature = "store-local")]
use crate::LocalItemStore;
#[cfg(feature = "store-memory")]
use crate::MemoryItemStore;
use crate::{ItemStore, StoreBackend, StoreResult};
use shutter_core::UploadConfig;
use std::sync::Arc;

/// Create a durable item store based on configuration
pub async fn create_store(config: &UploadConfig) -> StoreResult<Arc<dyn ItemStore>> {
    match config.store_backend {
        #[cfg(feature = "store-local")]
        StoreBackend::Local => {
            let store =
                LocalItemStore::new(config.store_path.clone(), config.max_session_bytes).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "store-local"))]
        StoreBackend::Local => Err(crate::StoreError::ConfigError(
            "Local store backend not available (store-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "store-memory")]
        StoreBackend::Memory => Ok(Arc::new(MemoryItemStore::new(config.max_session_bytes))),

        #[cfg(not(feature = "store-memory"))]
        StoreBackend::Memory => Err(crate::StoreError::ConfigError(
            "Memory store backend not available (store-memory feature not enabled)".to_string(),
        )),
    }
}
