//! Parameter publisher: both signal types are committed together, or the
//! previous record stays in force.

use thiserror::Error;
use tracing::{error, info};

use sigopt_core::domain::SignalType;

use crate::config_store::{ConfigRecord, ConfigStore, ProvenanceRecord};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("refusing to publish: no accepted config for {missing}")]
    Incomplete { missing: SignalType },
    #[error("config store rejected the record: {0}")]
    Replace(#[source] StoreError),
    #[error("provenance append failed (previous record restored: {restored}): {source}")]
    Provenance {
        #[source]
        source: StoreError,
        restored: bool,
    },
}

/// Replace the record, then append provenance. A provenance failure puts
/// `previous` back.
pub fn publish(
    store: &dyn ConfigStore,
    record: &ConfigRecord,
    provenance: &ProvenanceRecord,
    previous: Option<&ConfigRecord>,
) -> Result<(), PublishError> {
    if let Some(missing) = record.missing() {
        return Err(PublishError::Incomplete { missing });
    }

    store.replace(record).map_err(PublishError::Replace)?;

    if let Err(source) = store.append_provenance(provenance) {
        let restored = match store.restore(previous) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to restore previous config record");
                false
            }
        };
        return Err(PublishError::Provenance { source, restored });
    }

    info!(
        run_id = %record.run_id.short(),
        status = %provenance.status,
        params_hash = %&provenance.params_hash[..12.min(provenance.params_hash.len())],
        "published accepted configs"
    );
    Ok(())
}
