use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cortex_common::meta::Operator;
use cortex_common::records::decision::{Decision, DecisionStatus, DecisionType};
use cortex_common::CortexError;
use cortex_knowledge::metrics::metrics;
use cortex_pipeline::decode::decode_raw_request;
use cortex_store::operator_filter::owns;
use cortex_store::{RecordEvent, StoreClient};
use tokio::sync::{oneshot, RwLock};

use crate::collaborators::NovaServerLookup;
use crate::pipeline_watch::PipelineManager;
use crate::queue::WorkQueue;

fn decision_type_label(type_: DecisionType) -> &'static str {
    match type_ {
        DecisionType::NovaServer => "nova-server",
        DecisionType::CinderVolume => "cinder-volume",
        DecisionType::Pod => "pod",
        DecisionType::ManilaShare => "manila-share",
    }
}

/// What the HTTP dispatcher is actually waiting for: the subset of
/// `Decision.status` a caller needs to build its own response (spec §4.4
/// "HTTP handler returns ordered hosts").
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub ordered_hosts: Vec<String>,
    pub target: Option<String>,
    pub error: Option<String>,
}

struct PendingEntry {
    response_tx: oneshot::Sender<DecisionOutcome>,
}

/// The in-memory actor bridging the HTTP dispatch task and the Decision
/// reconciler (spec §3 "Ownership summary" / §9 Design Note "Controller
/// callbacks with shared state"). Guarded by a single read-write lock;
/// writes only happen at `register` and `take` (spec §5 "pendingRequests
/// map is guarded by a read-write lock; writes are at create and delete
/// only").
#[derive(Default)]
pub struct PendingRequests {
    entries: RwLock<HashMap<String, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// MUST be called before the Decision record itself is created, so
    /// the reconciler can never complete and find no listener to signal
    /// (spec §9 "creation MUST precede Decision creation to avoid losing
    /// the signal").
    pub async fn register(&self, name: String) -> oneshot::Receiver<DecisionOutcome> {
        let (tx, rx) = oneshot::channel();
        self.entries.write().await.insert(name, PendingEntry { response_tx: tx });
        rx
    }

    /// The caller gave up waiting (deadline/cancellation). Removing the
    /// entry here is what makes a later `signal` a harmless no-op rather
    /// than a blocked send (spec §4.4 "close cancelChan and remove the
    /// entry").
    pub async fn cancel(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    /// Delivers the outcome if anyone is still listening; otherwise the
    /// signal is silently dropped (spec §5 "the reconciler still
    /// completes... but its signal is dropped").
    pub async fn signal(&self, name: &str, outcome: DecisionOutcome) {
        if let Some(entry) = self.entries.write().await.remove(name) {
            let _ = entry.response_tx.send(outcome);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Accepts externally-posted requests, turns them into `Decision`
/// records, runs the resolved pipeline, and signals the HTTP waiter
/// (spec §4.4).
pub struct DecisionController {
    store: Arc<StoreClient>,
    manager: Arc<PipelineManager>,
    pending: Arc<PendingRequests>,
    operator: Operator,
    queue: Arc<WorkQueue<String>>,
}

impl DecisionController {
    pub fn new(store: Arc<StoreClient>, manager: Arc<PipelineManager>, pending: Arc<PendingRequests>, operator: Operator) -> Self {
        Self {
            store,
            manager,
            pending,
            operator,
            queue: Arc::new(WorkQueue::new()),
        }
    }

    /// Steps (1)-(3) of the HTTP ingress path (spec §4.4): register the
    /// pending entry, then create the Decision record, in that order.
    /// Step (4) — waiting on the channel under the caller's deadline — is
    /// the HTTP layer's job, since only it knows the caller's context.
    pub async fn dispatch(
        &self,
        decision_type: DecisionType,
        pipeline_ref: String,
        raw_request: serde_json::Value,
    ) -> Result<(String, oneshot::Receiver<DecisionOutcome>), CortexError> {
        let name = format!("decision-{}", uuid::Uuid::new_v4());
        let rx = self.pending.register(name.clone()).await;
        let decision = Decision {
            meta: cortex_common::meta::ObjectMeta::new(name.clone(), self.operator.clone()),
            spec: cortex_common::records::decision::DecisionSpec {
                type_: decision_type,
                pipeline_ref,
                raw_request,
            },
            status: DecisionStatus::default(),
        };
        if let Err(e) = self.store.put(&decision).await {
            // Nothing will ever reconcile this entry; drop it rather than leak it.
            self.pending.cancel(&name).await;
            return Err(e);
        }
        Ok((name, rx))
    }

    /// Lets the HTTP layer give up waiting (deadline/cancellation) without
    /// reaching into `PendingRequests` directly (spec §4.4 "If the caller
    /// cancels, close cancelChan and remove the entry").
    pub async fn pending_cancel(&self, name: &str) {
        self.pending.cancel(name).await;
    }

    /// Watches Decision records and enqueues every one this operator owns
    /// that hasn't been resolved yet.
    pub async fn run(&self) -> Result<(), CortexError> {
        self.queue.spawn_flush_loop();
        let workers = 4;
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = self.queue.clone();
            let this = self.clone_refs();
            handles.push(tokio::spawn(async move {
                loop {
                    let name = queue.pop().await;
                    if let Err(e) = this.reconcile(&name).await {
                        log::error!("reconciling decision {name}: {e}");
                    }
                }
            }));
        }

        let (existing, rev) = self.store.snapshot_with_rev::<Decision>().await?;
        for decision in existing {
            if owns(&self.operator, &decision.meta) && is_pending(&decision) {
                self.queue.push(decision.meta.name.clone()).await;
            }
        }
        let mut watch = self.store.watch::<Decision>(rev + 1).await?;
        loop {
            match watch.next().await {
                Some(Ok(events)) => {
                    for event in events {
                        if let RecordEvent::Put(decision) = event {
                            if owns(&self.operator, &decision.meta) && is_pending(&decision) {
                                self.queue.push(decision.meta.name.clone()).await;
                            }
                        }
                    }
                }
                Some(Err(e)) => log::warn!("decision watch error: {e}"),
                None => break,
            }
        }
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }

    fn clone_refs(&self) -> ReconcileHandles {
        ReconcileHandles {
            store: self.store.clone(),
            manager: self.manager.clone(),
            pending: self.pending.clone(),
        }
    }

    async fn reconcile(&self, name: &str) -> Result<(), CortexError> {
        self.clone_refs().reconcile(name).await
    }
}

/// The subset of `DecisionController` state a reconcile worker needs,
/// split out so each of the `workers` tasks in `run` can hold its own
/// cheap clone without sharing `&self` across tasks.
struct ReconcileHandles {
    store: Arc<StoreClient>,
    manager: Arc<PipelineManager>,
    pending: Arc<PendingRequests>,
}

impl ReconcileHandles {
    async fn reconcile(&self, name: &str) -> Result<(), CortexError> {
        let Some(mut decision) = self.store.get::<Decision>(name).await? else {
            return Ok(());
        };
        if !is_pending(&decision) {
            return Ok(());
        }

        let started = Instant::now();
        let kind_label = decision_type_label(decision.spec.type_);

        let outcome = self.run_pipeline(&decision).await;
        let took = started.elapsed();

        match outcome {
            Ok(pipeline_outcome) => {
                decision.status = DecisionStatus {
                    ordered_hosts: pipeline_outcome.ordered_subjects.clone(),
                    target: pipeline_outcome.target.clone(),
                    took,
                    error: None,
                    raw_input_weights: pipeline_outcome.raw_weights,
                    normalized_input_weights: pipeline_outcome.normalized_weights,
                    aggregated_weights: pipeline_outcome.aggregated_weights,
                };
                metrics().decision_total.with_label_values(&[kind_label, "success"]).inc();
                metrics().decision_duration_seconds.observe(took.as_secs_f64());
                log::info!(
                    "decision {name}: ran pipeline {} in {took:?}, target={:?}",
                    decision.spec.pipeline_ref,
                    pipeline_outcome.target
                );
                self.store.put(&decision).await?;
                self.pending
                    .signal(
                        name,
                        DecisionOutcome {
                            ordered_hosts: pipeline_outcome.ordered_subjects,
                            target: pipeline_outcome.target,
                            error: None,
                        },
                    )
                    .await;
            }
            Err(e) => {
                decision.status.error = Some(e.to_string());
                decision.status.took = took;
                metrics().decision_total.with_label_values(&[kind_label, "error"]).inc();
                log::warn!("decision {name}: pipeline run failed: {e}");
                self.store.put(&decision).await?;
                self.pending
                    .signal(
                        name,
                        DecisionOutcome {
                            ordered_hosts: Vec::new(),
                            target: None,
                            error: Some(e.to_string()),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn run_pipeline(&self, decision: &Decision) -> Result<cortex_pipeline::PipelineOutcome, CortexError> {
        let pipeline = self
            .manager
            .scheduling(&decision.spec.pipeline_ref)
            .await
            .ok_or_else(|| CortexError::Configuration(format!("pipeline {} not found", decision.spec.pipeline_ref)))?;
        let request = decode_raw_request(decision.spec.type_, &decision.spec.raw_request)?;
        pipeline.run(request).await
    }
}

fn is_pending(decision: &Decision) -> bool {
    decision.status.target.is_none() && decision.status.error.is_none()
}

/// Deletes Decisions whose referenced Nova server no longer exists and no
/// Reservation pins the same name (spec §4.4 "Cleanup").
pub struct DecisionCleanup {
    store: Arc<StoreClient>,
    operator: Operator,
    nova: Arc<dyn NovaServerLookup>,
}

impl DecisionCleanup {
    pub fn new(store: Arc<StoreClient>, operator: Operator, nova: Arc<dyn NovaServerLookup>) -> Self {
        Self { store, operator, nova }
    }

    pub async fn sweep(&self) -> Result<usize, CortexError> {
        let server_ids: std::collections::HashSet<String> = self.nova.list_server_ids().await?.into_iter().collect();
        let reservation_names: std::collections::HashSet<String> = self
            .store
            .list::<cortex_common::records::Reservation>()
            .await?
            .into_iter()
            .map(|r| r.meta.name)
            .collect();

        let decisions = self.store.list::<Decision>().await?;
        let mut deleted = 0;
        for decision in decisions {
            if !owns(&self.operator, &decision.meta) || decision.spec.type_ != DecisionType::NovaServer {
                continue;
            }
            let Some(instance_uuid) = cortex_pipeline::decode::nova_instance_uuid(&decision.spec.raw_request) else {
                continue;
            };
            if server_ids.contains(&instance_uuid) || reservation_names.contains(&decision.meta.name) {
                continue;
            }
            self.store.delete::<Decision>(&decision.meta.name).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_removes_the_pending_entry() {
        let pending = PendingRequests::new();
        let _rx = pending.register("d1".to_string()).await;
        assert_eq!(pending.len().await, 1);
        pending.cancel("d1").await;
        assert_eq!(pending.len().await, 0);
        // Signaling after cancel is a harmless no-op, not a panic.
        pending
            .signal(
                "d1",
                DecisionOutcome {
                    ordered_hosts: vec![],
                    target: None,
                    error: None,
                },
            )
            .await;
    }

    #[tokio::test]
    async fn signal_delivers_to_a_still_registered_waiter() {
        let pending = PendingRequests::new();
        let rx = pending.register("d2".to_string()).await;
        pending
            .signal(
                "d2",
                DecisionOutcome {
                    ordered_hosts: vec!["host1".to_string()],
                    target: Some("host1".to_string()),
                    error: None,
                },
            )
            .await;
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.target.as_deref(), Some("host1"));
        assert_eq!(pending.len().await, 0);
    }
}
