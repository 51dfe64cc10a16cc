use async_trait::async_trait;
use cortex_common::CortexError;
use cortex_pipeline::knowledge_db::ToSqlParam;
use cortex_pipeline::{BaseStep, CycleState, DbResolver, PipelineRequest, Step, StepInitContext, StepResult};

const FEATURE_TABLE: &str = "feature_host_pinned_projects";

fn row_str<'a>(row: &'a cortex_pipeline::FeatureRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_str())
}

/// Drops hosts aggregate-pinned to a project other than the request's
/// (spec §8 scenario S5). A host with no pinning row is unrestricted.
pub struct FilterPinnedProjects {
    base: BaseStep,
}

impl FilterPinnedProjects {
    pub fn new() -> Self {
        Self {
            base: BaseStep::new("filter_pinned_projects"),
        }
    }
}

impl Default for FilterPinnedProjects {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for FilterPinnedProjects {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.base.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, _cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        let Some(project_id) = request.payload.project_id() else {
            // Non-project-scoped requests (e.g. pods) aren't subject to
            // aggregate pinning.
            return Ok(self.base.prepare_result(request));
        };

        let db = self.base.db().await?;
        let mut result = StepResult::new();

        for host in request.subjects() {
            let rows = db
                .query(
                    "filter_pinned_projects",
                    &format!("SELECT * FROM {FEATURE_TABLE} WHERE compute_host = $1"),
                    &[host as &(dyn ToSqlParam + Sync)],
                )
                .await?;
            let pinned_to = rows.first().and_then(|row| row_str(row, "project_id").map(|s| s.to_string()));
            match pinned_to {
                Some(pinned) if pinned != project_id => continue,
                _ => result.set(host.clone(), 0.0),
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

    fn pin_row(project_id: &str) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert("project_id".into(), serde_json::json!(project_id));
        row
    }

    #[tokio::test]
    async fn s5_removes_hosts_pinned_to_other_projects() {
        let mut rows = HashMap::new();
        rows.insert("host2".to_string(), pin_row("p1"));
        rows.insert("host3".to_string(), pin_row("p2"));
        let db: Arc<dyn KnowledgeDb> = Arc::new(FakeDb { rows });

        let step = FilterPinnedProjects::new();
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
                project_id: Some("p1".to_string()),
                flavor_name: None,
                vcpus: 0,
                memory_mb: 0,
            },
        );
        let mut cycle = CycleState::new();
        let result = step.run(&request, &mut cycle).await.unwrap();

        let mut surviving: Vec<&String> = result.activations.keys().collect();
        surviving.sort();
        assert_eq!(surviving, vec!["host1", "host2"]);
    }
}
