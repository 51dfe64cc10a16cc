use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::records::reservation::ReservationPhase;
use cortex_common::records::Reservation;
use cortex_common::CortexError;
use cortex_steps::capacity::{ReservationDemand, ReservationLookup};
use cortex_store::StoreClient;

/// Backs `FilterHasEnoughCapacity`'s reservation accounting with the live
/// record store (spec §3 "Reservation" invariant: "once Active, host and
/// resources are treated as consumed ... for any unrelated request").
pub struct StoreReservationLookup {
    store: Arc<StoreClient>,
}

impl StoreReservationLookup {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReservationLookup for StoreReservationLookup {
    async fn active_on(&self, host: &str) -> Result<Vec<ReservationDemand>, CortexError> {
        let reservations = self.store.list::<Reservation>().await?;
        Ok(reservations
            .into_iter()
            .filter(|r| r.status.phase == ReservationPhase::Active && r.status.host.as_deref() == Some(host))
            .map(|r| ReservationDemand {
                project_id: r.spec.project_id,
                flavor_name: r.spec.flavor_name,
                vcpus: r.spec.vcpus,
                memory_mb: r.spec.memory_mb,
            })
            .collect())
    }
}
