//! Session store implementations for RiskProfiler.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileSessionStore;
pub use in_memory::InMemorySessionStore;

use riskprofiler_config::StoreConfig;
use riskprofiler_core::error::StoreError;
use riskprofiler_core::store::SessionStore;
use std::sync::Arc;

/// Build the store selected by `store.backend`.
pub fn build_from_config(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend.as_str() {
        "file" => Ok(Arc::new(FileSessionStore::open(config.sessions_dir())?)),
        "memory" => Ok(Arc::new(InMemorySessionStore::new())),
        other => Err(StoreError::Storage(format!("unknown store backend '{other}'"))),
    }
}
