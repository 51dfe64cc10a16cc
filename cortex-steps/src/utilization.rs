use async_trait::async_trait;
use cortex_common::CortexError;
use cortex_pipeline::knowledge_db::ToSqlParam;
use cortex_pipeline::{BaseStep, CycleState, DbResolver, PipelineRequest, Step, StepInitContext, StepResult};

const FEATURE_TABLE: &str = "feature_host_utilization";

fn row_f64(row: &cortex_pipeline::FeatureRow, column: &str) -> Option<f64> {
    row.get(column).and_then(|v| v.as_f64())
}

/// Activates each host by its average vcpu/memory utilization percentage
/// (spec §8 scenario S1: `+utilization_pct/100`). A host with no feature
/// row keeps its default 0.0 activation rather than being filtered —
/// weighers only adjust, they never remove.
pub struct WeigherUtilization {
    base: BaseStep,
}

impl WeigherUtilization {
    pub fn new() -> Self {
        Self {
            base: BaseStep::new("weigher_utilization"),
        }
    }
}

impl Default for WeigherUtilization {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for WeigherUtilization {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.base.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, _cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        let db = self.base.db().await?;
        let mut result = self.base.prepare_result(request);

        for host in request.subjects() {
            let rows = db
                .query(
                    "weigher_utilization",
                    &format!("SELECT * FROM {FEATURE_TABLE} WHERE compute_host = $1"),
                    &[host as &(dyn ToSqlParam + Sync)],
                )
                .await?;
            let Some(row) = rows.first() else {
                continue;
            };
            let vcpu_pct = row_f64(row, "vcpu_pct").unwrap_or(0.0);
            let mem_pct = row_f64(row, "mem_pct").unwrap_or(0.0);
            let utilization_pct = (vcpu_pct + mem_pct) / 2.0;
            result.set(host.clone(), utilization_pct / 100.0);
            result.set_stat(host, "utilization_pct", utilization_pct, "percent");
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
    use std::sync::Arc;

    struct FakeDb {
        rows: HashMap<String, FeatureRow>,
    }

    #[async_trait]
    impl KnowledgeDb for FakeDb {
        async fn query(
            &self,
            _name: &str,
            _sql: &str,
            params: &[&(dyn ToSqlParam + Sync)],
        ) -> Result<Vec<FeatureRow>, CortexError> {
            let host = params[0].as_text();
            Ok(self.rows.get(&host).cloned().into_iter().collect())
        }
    }

    struct AlwaysDbResolver(Arc<dyn KnowledgeDb>);

    #[async_trait]
    impl DbResolver for AlwaysDbResolver {
        async fn resolve(&self, _secret_ref: &cortex_common::SecretRef) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
            Ok(self.0.clone())
        }
    }

    fn util_row(vcpu_pct: f64, mem_pct: f64) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("vcpu_pct".into(), serde_json::json!(vcpu_pct));
        row.insert("mem_pct".into(), serde_json::json!(mem_pct));
        row
    }

    #[tokio::test]
    async fn s1_orders_hosts_by_utilization() {
        let mut rows = HashMap::new();
        rows.insert("host1".to_string(), util_row(40.0, 50.0));
        rows.insert("host2".to_string(), util_row(70.0, 80.0));
        rows.insert("host3".to_string(), util_row(15.0, 20.0));
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb { rows });

        let step = WeigherUtilization::new();
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

        let request = PipelineRequest::new(
            vec!["host1".to_string(), "host2".to_string(), "host3".to_string()],
            HashMap::new(),
            RequestPayload::Synthetic {
                project_id: None,
                flavor_name: None,
                vcpus: 0,
                memory_mb: 0,
            },
        );
        let mut cycle = CycleState::new();
        let result = step.run(&request, &mut cycle).await.unwrap();

        assert!((result.activations["host1"] - 0.45).abs() < 1e-9);
        assert!((result.activations["host2"] - 0.75).abs() < 1e-9);
        assert!((result.activations["host3"] - 0.175).abs() < 1e-9);
    }
}
