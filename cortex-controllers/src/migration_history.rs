use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::descheduling::{DeschedulingPhase, RefType};
use cortex_common::records::Descheduling;
use cortex_common::CortexError;
use cortex_pipeline::cycle_detector::MigrationHistoryProvider;
use cortex_store::StoreClient;

/// Reconstructs a VM's migration chain from its completed `Descheduling`
/// records, oldest first (spec §4.2 "cycle detector" / §3 "Descheduling").
/// Only `Completed` records carry a trustworthy `new_host`; `Failed` ones
/// never moved the VM and are excluded from the chain.
pub struct StoreMigrationHistory {
    store: Arc<StoreClient>,
}

impl StoreMigrationHistory {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MigrationHistoryProvider for StoreMigrationHistory {
    async fn history(&self, vm_id: &str) -> Result<Vec<(String, String)>, CortexError> {
        let mut records: Vec<Descheduling> = self
            .store
            .list::<Descheduling>()
            .await?
            .into_iter()
            .filter(|d| d.spec.ref_type == RefType::NovaServer && d.spec.ref_ == vm_id && d.status.phase == DeschedulingPhase::Completed)
            .collect();
        records.sort_by_key(|d| d.meta.created_at);
        Ok(records
            .into_iter()
            .filter_map(|d| d.status.new_host.map(|new_host| (d.spec.prev_host, new_host)))
            .collect())
    }
}
