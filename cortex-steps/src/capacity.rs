use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::CortexError;
use cortex_pipeline::knowledge_db::ToSqlParam;
use cortex_pipeline::{BaseStep, CycleState, DbResolver, PipelineRequest, Step, StepInitContext, StepResult};

const FEATURE_TABLE: &str = "feature_host_capacity";

/// Extra demand an Active Reservation places on a host beyond what's
/// already reflected in `feature_host_capacity`'s in-use counters (spec
/// §3 "Reservation" invariant). Backed by the record store, not a
/// knowledge-plane feature table, since Reservations are declarative
/// records the core itself owns.
#[derive(Debug, Clone)]
pub struct ReservationDemand {
    pub project_id: String,
    pub flavor_name: String,
    pub vcpus: u64,
    pub memory_mb: u64,
}

#[async_trait]
pub trait ReservationLookup: Send + Sync {
    async fn active_on(&self, host: &str) -> Result<Vec<ReservationDemand>, CortexError>;
}

pub struct NoReservationLookup;

#[async_trait]
impl ReservationLookup for NoReservationLookup {
    async fn active_on(&self, _host: &str) -> Result<Vec<ReservationDemand>, CortexError> {
        Ok(Vec::new())
    }
}

struct CapacityRow {
    vcpu_total: f64,
    vcpu_used: f64,
    memory_mb_total: f64,
    memory_mb_used: f64,
}

fn row_f64(row: &cortex_pipeline::FeatureRow, column: &str) -> Option<f64> {
    row.get(column).and_then(|v| v.as_f64())
}

/// Filters out hosts that cannot fit the requested vcpu/memory once
/// in-use consumption and any non-matching Active reservation are
/// subtracted from total capacity (spec §4.2/§8 scenarios S2, S3). Only
/// scopes itself to requests that carry a nonzero compute footprint;
/// Pod/Manila/Cinder requests pass through untouched.
pub struct FilterHasEnoughCapacity {
    base: BaseStep,
    reservations: Arc<dyn ReservationLookup>,
}

impl FilterHasEnoughCapacity {
    pub fn new() -> Self {
        Self {
            base: BaseStep::new("filter_has_enough_capacity"),
            reservations: Arc::new(NoReservationLookup),
        }
    }

    pub fn with_reservations(mut self, reservations: Arc<dyn ReservationLookup>) -> Self {
        self.reservations = reservations;
        self
    }
}

impl Default for FilterHasEnoughCapacity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for FilterHasEnoughCapacity {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.base.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, _cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        let requested_vcpus = request.payload.requested_vcpus();
        let requested_memory_mb = request.payload.requested_memory_mb();
        if requested_vcpus == 0 && requested_memory_mb == 0 {
            return Ok(self.base.prepare_result(request));
        }

        let db = self.base.db().await?;
        let mut result = StepResult::new();

        for host in request.subjects() {
            let rows = db
                .query(
                    "filter_has_enough_capacity",
                    &format!("SELECT * FROM {FEATURE_TABLE} WHERE compute_host = $1"),
                    &[host as &(dyn ToSqlParam + Sync)],
                )
                .await?;
            let Some(row) = rows.first() else {
                // Unknown host: tolerate by treating as filtered, per
                // the knowledge-plane's "missing row" invariant.
                continue;
            };
            let capacity = CapacityRow {
                vcpu_total: row_f64(row, "vcpu_total").unwrap_or(0.0),
                vcpu_used: row_f64(row, "vcpu_used").unwrap_or(0.0),
                memory_mb_total: row_f64(row, "memory_mb_total").unwrap_or(0.0),
                memory_mb_used: row_f64(row, "memory_mb_used").unwrap_or(0.0),
            };

            let mut reserved_vcpus = 0.0_f64;
            let mut reserved_memory_mb = 0.0_f64;
            for demand in self.reservations.active_on(host).await? {
                let matches_this_request = request.payload.project_id() == Some(demand.project_id.as_str())
                    && request.payload.flavor_name() == Some(demand.flavor_name.as_str());
                if matches_this_request {
                    continue;
                }
                reserved_vcpus += demand.vcpus as f64;
                reserved_memory_mb += demand.memory_mb as f64;
            }

            let available_vcpus = capacity.vcpu_total - capacity.vcpu_used - reserved_vcpus;
            let available_memory_mb = capacity.memory_mb_total - capacity.memory_mb_used - reserved_memory_mb;

            if requested_vcpus as f64 <= available_vcpus && requested_memory_mb as f64 <= available_memory_mb {
                result.set(host.clone(), 0.0);
                result.set_stat(host, "available_vcpus", available_vcpus, "vcpu");
                result.set_stat(host, "available_memory_mb", available_memory_mb, "mb");
            }
        }

        Ok(result)
    }

    async fn deinit(&self) {
        self.base.deinit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_pipeline::{knowledge_db::FeatureRow, KnowledgeDb, RequestPayload};
    use std::collections::HashMap;

    struct FakeDb {
        rows: HashMap<String, FeatureRow>,
    }

    #[async_trait]
    impl KnowledgeDb for FakeDb {
        async fn query(
            &self,
            _name: &str,
            _sql: &str,
            params: &[&(dyn cortex_pipeline::knowledge_db::ToSqlParam + Sync)],
        ) -> Result<Vec<FeatureRow>, CortexError> {
            let host = params[0].as_text();
            Ok(self.rows.get(&host).cloned().into_iter().collect())
        }
    }

    struct FakeReservations {
        demands: HashMap<String, Vec<ReservationDemand>>,
    }

    #[async_trait]
    impl ReservationLookup for FakeReservations {
        async fn active_on(&self, host: &str) -> Result<Vec<ReservationDemand>, CortexError> {
            Ok(self.demands.get(host).cloned().unwrap_or_default())
        }
    }

    fn capacity_row(vcpu_total: f64, vcpu_used: f64, memory_mb_total: f64, memory_mb_used: f64) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("vcpu_total".into(), serde_json::json!(vcpu_total));
        row.insert("vcpu_used".into(), serde_json::json!(vcpu_used));
        row.insert("memory_mb_total".into(), serde_json::json!(memory_mb_total));
        row.insert("memory_mb_used".into(), serde_json::json!(memory_mb_used));
        row
    }

    struct AlwaysDbResolver(Arc<dyn KnowledgeDb>);

    #[async_trait]
    impl DbResolver for AlwaysDbResolver {
        async fn resolve(&self, _secret_ref: &cortex_common::SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
            Ok(self.0.clone())
        }
    }

    fn nova_request(subjects: Vec<&str>, project_id: &str, flavor_name: &str, vcpus: u64, memory_mb: u64) -> PipelineRequest {
        PipelineRequest::new(
            subjects.into_iter().map(String::from).collect(),
            HashMap::new(),
            RequestPayload::Synthetic {
                project_id: Some(project_id.to_string()),
                flavor_name: Some(flavor_name.to_string()),
                vcpus,
                memory_mb,
            },
        )
    }

    #[tokio::test]
    async fn s2_reservation_adds_to_consumption_and_filters_host() {
        let mut rows = HashMap::new();
        rows.insert("host1".to_string(), capacity_row(16.0, 4.0, 32768.0, 8192.0));
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb { rows });

        let mut demands = HashMap::new();
        demands.insert(
            "host1".to_string(),
            vec![ReservationDemand {
                project_id: "other-project".to_string(),
                flavor_name: "other-flavor".to_string(),
                vcpus: 4,
                memory_mb: 4096,
            }],
        );
        let reservations: Arc<dyn ReservationLookup> = Arc::new(FakeReservations { demands });

        let step = FilterHasEnoughCapacity::new().with_reservations(reservations);
        step.base
            .init(
                StepInitContext {
                    options: serde_json::Value::Null,
                    database_secret_ref: Some(cortex_common::SecretRef {
                        name: "db".to_string(),
                        key: "dsn".to_string(),
                    }),
                },
                &AlwaysDbResolver(db),
            )
            .await
            .unwrap();

        let request = nova_request(vec!["host1"], "p", "F", 14, 1);
        let mut cycle = CycleState::new();
        let result = step.run(&request, &mut cycle).await.unwrap();
        assert!(result.activations.is_empty());
    }

    #[tokio::test]
    async fn s3_matching_reservation_is_not_double_counted() {
        let mut rows = HashMap::new();
        rows.insert("host1".to_string(), capacity_row(16.0, 4.0, 32768.0, 8192.0));
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb { rows });

        let mut demands = HashMap::new();
        demands.insert(
            "host1".to_string(),
            vec![ReservationDemand {
                project_id: "p".to_string(),
                flavor_name: "F".to_string(),
                vcpus: 4,
                memory_mb: 4096,
            }],
        );
        let reservations: Arc<dyn ReservationLookup> = Arc::new(FakeReservations { demands });

        let step = FilterHasEnoughCapacity::new().with_reservations(reservations);
        step.base
            .init(
                StepInitContext {
                    options: serde_json::Value::Null,
                    database_secret_ref: Some(cortex_common::SecretRef {
                        name: "db".to_string(),
                        key: "dsn".to_string(),
                    }),
                },
                &AlwaysDbResolver(db),
            )
            .await
            .unwrap();

        let request = nova_request(vec!["host1"], "p", "F", 6, 1);
        let mut cycle = CycleState::new();
        let result = step.run(&request, &mut cycle).await.unwrap();
        assert_eq!(result.activations.len(), 1);
        assert!(result.activations.contains_key("host1"));
    }
}
