use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cortex_common::CortexError;

use crate::cycle_state::CycleState;
use crate::knowledge_db::DbResolver;
use crate::request::{PipelineRequest, Subject};
use crate::step::{Step, StepInitContext, StepResult};

const TOP_K: usize = 5;
const CUMULATIVE_KEY: &str = "cortex/monitor/cumulative_weights";

/// Top-K subject names by descending cumulative weight, most-significant
/// first. Ties broken by subject name for a stable, deterministic order.
fn top_k(weights: &HashMap<Subject, f64>, k: usize) -> Vec<Subject> {
    let mut subjects: Vec<Subject> = weights.keys().cloned().collect();
    subjects.sort_by(|a, b| {
        weights[b]
            .partial_cmp(&weights[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    subjects.truncate(k);
    subjects
}

/// Records step latency, subjects removed, top-K reordering distance, and
/// a per-statistic impact metric (spec §4.3 "Monitor"). Wraps the
/// innermost step so its latency measurement isn't inflated by the
/// validator or scoper.
pub struct Monitor {
    inner: Arc<dyn Step>,
}

impl Monitor {
    pub fn new(inner: Arc<dyn Step>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Step for Monitor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        self.inner.init(ctx, resolver).await
    }

    async fn run(&self, request: &PipelineRequest, cycle: &mut CycleState) -> Result<StepResult, CortexError> {
        let prior_cumulative: HashMap<Subject, f64> = cycle
            .read::<HashMap<Subject, f64>>(CUMULATIVE_KEY)
            .cloned()
            .unwrap_or_else(|| request.weights().clone());
        let pre_ranking = top_k(&prior_cumulative, TOP_K);

        let started = Instant::now();
        let result = self.inner.run(request, cycle).await?;
        let latency = started.elapsed();

        let removed = request.subjects().len().saturating_sub(result.activations.len());

        let new_cumulative: HashMap<Subject, f64> = result
            .activations
            .iter()
            .map(|(subject, activation)| {
                let base = prior_cumulative.get(subject).copied().unwrap_or(0.0);
                (subject.clone(), base + activation.tanh())
            })
            .collect();
        let post_ranking = top_k(&new_cumulative, TOP_K);

        let reorder_distance: usize = post_ranking
            .iter()
            .map(|subject| {
                let pre_idx = pre_ranking.iter().position(|s| s == subject).unwrap_or(pre_ranking.len());
                let post_idx = post_ranking.iter().position(|s| s == subject).unwrap_or(0);
                pre_idx.abs_diff(post_idx)
            })
            .sum();

        let mut stat_names: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for stats in result.stats.values() {
            stat_names.extend(stats.keys().map(|s| s.as_str()));
        }
        let mut impact = 0.0_f64;
        for stat_name in stat_names {
            for subject in &post_ranking {
                let pre_idx = pre_ranking.iter().position(|s| s == subject).unwrap_or(pre_ranking.len());
                let post_idx = post_ranking.iter().position(|s| s == subject).unwrap_or(0);
                let stat_at = |ranking: &[Subject], idx: usize| -> f64 {
                    ranking
                        .get(idx)
                        .and_then(|s| result.stats.get(s))
                        .and_then(|m| m.get(stat_name))
                        .map(|v| v.value)
                        .unwrap_or(0.0)
                };
                let old_stat = stat_at(&pre_ranking, pre_idx);
                let new_stat = stat_at(&post_ranking, post_idx);
                impact += (pre_idx as f64 - post_idx as f64).abs() * (old_stat - new_stat).abs();
            }
        }

        log::debug!(
            "step {}: latency={:?} removed={} reorder_distance={} impact={:.4}",
            self.inner.name(),
            latency,
            removed,
            reorder_distance,
            impact
        );

        cycle.write(CUMULATIVE_KEY, new_cumulative);
        Ok(result)
    }

    async fn deinit(&self) {
        self.inner.deinit().await
    }
}
