use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cortex_common::meta::Operator;
use cortex_common::records::reservation::{Reservation, ReservationPhase};
use cortex_common::CortexError;
use cortex_pipeline::request::RequestPayload;
use cortex_pipeline::PipelineRequest;
use cortex_store::operator_filter::owns;
use cortex_store::StoreClient;

use crate::collaborators::{HypervisorLookup, ReservationScheduler};
use crate::pipeline_watch::PipelineManager;
use crate::queue::{jittered, WorkQueue};

const SUPPORTED_SCHEDULER: &str = "cortex-nova";
const RESERVATIONS_PIPELINE: &str = "reservations";
const FAILURE_REQUEUE: Duration = Duration::from_secs(30);

/// Backs `ReservationScheduler` with an in-process run of the named
/// scheduling pipeline, since the Decision controller and HTTP surface
/// share this process (spec §4.6 "POST a synthesized scheduling request
/// to the internal scheduler endpoint" — here, a direct call rather than
/// a loopback HTTP round trip).
pub struct InProcessReservationScheduler {
    manager: Arc<PipelineManager>,
}

impl InProcessReservationScheduler {
    pub fn new(manager: Arc<PipelineManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ReservationScheduler for InProcessReservationScheduler {
    async fn schedule(
        &self,
        pipeline: &str,
        candidate_hosts: Vec<String>,
        vcpus: u64,
        memory_mb: u64,
        project_id: &str,
        flavor_name: &str,
    ) -> Result<Vec<String>, CortexError> {
        let scheduling = self
            .manager
            .scheduling(pipeline)
            .await
            .ok_or_else(|| CortexError::Configuration(format!("reservation pipeline {pipeline} not found")))?;
        let request = PipelineRequest::new(
            candidate_hosts,
            std::collections::HashMap::new(),
            RequestPayload::Synthetic {
                project_id: Some(project_id.to_string()),
                flavor_name: Some(flavor_name.to_string()),
                vcpus,
                memory_mb,
            },
        );
        let outcome = scheduling.run(request).await?;
        Ok(outcome.ordered_subjects)
    }
}

/// Pre-picks a host for each `Reservation` not yet Active (spec §4.6).
/// Reconciled with at most one in-flight request at a time, matching the
/// spec's `MaxConcurrentReconciles = 1` for this controller (spec §5).
pub struct ReservationController {
    store: Arc<StoreClient>,
    hypervisors: Arc<dyn HypervisorLookup>,
    scheduler: Arc<dyn ReservationScheduler>,
    operator: Operator,
    queue: Arc<WorkQueue<String>>,
}

impl ReservationController {
    pub fn new(store: Arc<StoreClient>, hypervisors: Arc<dyn HypervisorLookup>, scheduler: Arc<dyn ReservationScheduler>, operator: Operator) -> Self {
        Self {
            store,
            hypervisors,
            scheduler,
            operator,
            queue: Arc::new(WorkQueue::new()),
        }
    }

    pub async fn run(&self) -> Result<(), CortexError> {
        self.queue.spawn_flush_loop();
        let (existing, rev) = self.store.snapshot_with_rev::<Reservation>().await?;
        for reservation in existing {
            if owns(&self.operator, &reservation.meta) && reservation.status.phase != ReservationPhase::Active {
                self.queue.push(reservation.meta.name.clone()).await;
            }
        }
        let mut watch = self.store.watch::<Reservation>(rev + 1).await?;
        loop {
            tokio::select! {
                name = self.queue.pop() => {
                    if let Err(e) = self.reconcile(&name).await {
                        log::error!("reconciling reservation {name}: {e}");
                    }
                }
                batch = watch.next() => {
                    match batch {
                        Some(Ok(events)) => {
                            for event in events {
                                if let cortex_store::RecordEvent::Put(reservation) = event {
                                    if owns(&self.operator, &reservation.meta) && reservation.status.phase != ReservationPhase::Active {
                                        self.queue.push(reservation.meta.name.clone()).await;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => log::warn!("reservation watch error: {e}"),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn reconcile(&self, name: &str) -> Result<(), CortexError> {
        let Some(mut reservation) = self.store.get::<Reservation>(name).await? else {
            return Ok(());
        };
        if reservation.status.phase == ReservationPhase::Active {
            return Ok(());
        }

        if let Err(e) = self.try_schedule(&mut reservation).await {
            reservation.status.phase = ReservationPhase::Failed;
            reservation.status.error = Some(e.to_string());
            log::warn!("reservation {name}: scheduling failed: {e}, requeueing");
            self.store.put(&reservation).await?;
            self.queue.push_after(name.to_string(), jittered(FAILURE_REQUEUE, 0.2)).await;
            return Ok(());
        }
        self.store.put(&reservation).await?;
        Ok(())
    }

    async fn try_schedule(&self, reservation: &mut Reservation) -> Result<(), CortexError> {
        if reservation.spec.scheduler != SUPPORTED_SCHEDULER {
            return Err(CortexError::Configuration(format!("unsupported scheduler {}", reservation.spec.scheduler)));
        }
        let hypervisor_type = reservation
            .spec
            .extra_specs
            .get("capabilities:hypervisor_type")
            .ok_or_else(|| CortexError::Configuration("reservation missing capabilities:hypervisor_type extra spec".to_string()))?;

        let candidates: Vec<String> = self
            .hypervisors
            .list_hypervisors()
            .await?
            .into_iter()
            .filter(|h| &h.hypervisor_type == hypervisor_type)
            .map(|h| h.host)
            .collect();
        if candidates.is_empty() {
            return Err(CortexError::Configuration(format!("no hypervisors of type {hypervisor_type}")));
        }

        let ordered = self
            .scheduler
            .schedule(
                RESERVATIONS_PIPELINE,
                candidates,
                reservation.spec.vcpus,
                reservation.spec.memory_mb,
                &reservation.spec.project_id,
                &reservation.spec.flavor_name,
            )
            .await?;
        let chosen = ordered.first().cloned().ok_or_else(|| CortexError::Configuration("reservations pipeline returned no hosts".to_string()))?;

        reservation.status.phase = ReservationPhase::Active;
        reservation.status.host = Some(chosen);
        reservation.status.error = None;
        Ok(())
    }
}
