//! Reading back persisted analyses, and wiping everything the app stored.

use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::models::{record_key, AnalysisRecord, RECORD_KEY_PREFIX};
use crate::platform::memory::UPLOAD_ROOT;
use crate::platform::KvListing;
use crate::store::adapters::{CapabilityError, CapabilityResult};
use crate::store::Store;

/// Every stored record. Entries that no longer parse are skipped; records
/// carry no schema version, so a feedback shape change strands older ones.
pub async fn list_records(store: &Store) -> CapabilityResult<Vec<AnalysisRecord>> {
    let pattern = format!("{RECORD_KEY_PREFIX}*");
    let entries = match store.kv_list_with_values(&pattern).await? {
        KvListing::Entries(entries) => entries,
        KvListing::Keys(_) => {
            return Err(CapabilityError::Failed(
                "kv.list returned keys without values".to_string(),
            ))
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(
            |entry| match serde_json::from_str::<AnalysisRecord>(&entry.value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable record {}: {e}", entry.key);
                    None
                }
            },
        )
        .collect())
}

#[derive(Debug)]
pub enum LoadError {
    Capability(CapabilityError),
    Corrupt(serde_json::Error),
}

/// One record by id; `Ok(None)` when nothing is stored under its key.
pub async fn load_record(store: &Store, id: Uuid) -> Result<Option<AnalysisRecord>, LoadError> {
    let Some(json) = store
        .kv_get(&record_key(id))
        .await
        .map_err(LoadError::Capability)?
    else {
        return Ok(None);
    };
    serde_json::from_str(&json)
        .map(Some)
        .map_err(LoadError::Corrupt)
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeSummary {
    pub files_deleted: usize,
}

/// Deletes every uploaded blob, then flushes the key-value store.
/// Stops at the first failure; whatever was already deleted stays deleted.
pub async fn wipe(store: &Store) -> CapabilityResult<WipeSummary> {
    let files = store.fs_list(UPLOAD_ROOT).await?;
    for file in &files {
        store.fs_delete(&file.path).await?;
    }
    store.kv_flush().await?;

    info!("Wiped {} files and all key-value data", files.len());
    Ok(WipeSummary {
        files_deleted: files.len(),
    })
}
