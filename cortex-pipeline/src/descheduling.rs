use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::CortexError;

use crate::knowledge_db::DbResolver;
use crate::step::StepInitContext;

/// One step's nomination that a VM be moved off its current host (spec
/// §4.2 "For descheduling pipelines").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeschedulingCandidate {
    pub vm_id: String,
    pub host: String,
    pub reason: String,
}

/// A descheduling step independently returns its own candidate list;
/// there is no shared subject set or filtering semantics (spec §4.2).
#[async_trait]
pub trait DeschedulingStep: Send + Sync {
    fn name(&self) -> &str;
    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError>;
    async fn run(&self) -> Result<Vec<DeschedulingCandidate>, CortexError>;
    async fn deinit(&self);
}

/// Combines per-step decisions (spec §4.2 "combines"): groups by vmID; a
/// vmID nominated with conflicting hosts is dropped with a logged
/// warning; otherwise reasons are coalesced. Sorts `named_results` by
/// step name itself (application order, spec §4.2) so the coalesced
/// reason string is deterministic regardless of the fan-out completion
/// order or the order callers pass results in (spec §8 property 7).
pub fn combine(mut named_results: Vec<(String, Vec<DeschedulingCandidate>)>) -> Vec<DeschedulingCandidate> {
    struct Acc {
        host: String,
        reasons: Vec<String>,
        conflict: bool,
    }

    named_results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut acc: BTreeMap<String, Acc> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    for (_step_name, candidates) in named_results {
        for candidate in candidates {
            match acc.get_mut(&candidate.vm_id) {
                None => {
                    order.push(candidate.vm_id.clone());
                    acc.insert(
                        candidate.vm_id.clone(),
                        Acc {
                            host: candidate.host.clone(),
                            reasons: vec![candidate.reason.clone()],
                            conflict: false,
                        },
                    );
                }
                Some(entry) => {
                    if entry.host != candidate.host {
                        log::warn!(
                            "dropping descheduling candidate {}: conflicting hosts {} vs {}",
                            candidate.vm_id,
                            entry.host,
                            candidate.host
                        );
                        entry.conflict = true;
                    } else {
                        entry.reasons.push(candidate.reason.clone());
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|vm_id| {
            let entry = acc.remove(&vm_id)?;
            if entry.conflict {
                return None;
            }
            let reason = if entry.reasons.len() > 1 {
                format!("multiple reasons: {}", entry.reasons.join("; "))
            } else {
                entry.reasons[0].clone()
            };
            Some(DeschedulingCandidate {
                vm_id,
                host: entry.host,
                reason,
            })
        })
        .collect()
}

/// An ordered composition of descheduling steps. Unlike the scheduling
/// pipeline, steps fan out concurrently since each independently scans
/// the whole cluster (spec §4.2/§5).
pub struct DeschedulingPipeline {
    pub name: String,
    steps: Vec<Arc<dyn DeschedulingStep>>,
}

impl DeschedulingPipeline {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn DeschedulingStep>>) -> Self {
        Self { name: name.into(), steps }
    }

    /// Releases every step's resources, mirroring `Pipeline::deinit_all`.
    pub async fn deinit_all(&self) {
        for step in &self.steps {
            step.deinit().await;
        }
    }

    pub async fn run(&self) -> Result<Vec<DeschedulingCandidate>, CortexError> {
        let mut futures = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            futures.push(async move {
                match step.run().await {
                    Ok(candidates) => Ok((step.name().to_string(), candidates)),
                    Err(e) if e.is_skip() => Ok((step.name().to_string(), Vec::new())),
                    Err(e) => Err(e),
                }
            });
        }
        let results = futures::future::try_join_all(futures).await?;
        Ok(combine(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(vm: &str, host: &str, reason: &str) -> DeschedulingCandidate {
        DeschedulingCandidate {
            vm_id: vm.to_string(),
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn combine_coalesces_agreeing_reasons() {
        let results = vec![
            ("a_step".to_string(), vec![cand("vm1", "hostA", "overloaded")]),
            ("b_step".to_string(), vec![cand("vm1", "hostA", "contended")]),
        ];
        let combined = combine(results);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].reason, "multiple reasons: overloaded; contended");
    }

    #[test]
    fn combine_drops_conflicting_hosts() {
        let results = vec![
            ("a_step".to_string(), vec![cand("vm1", "hostA", "overloaded")]),
            ("b_step".to_string(), vec![cand("vm1", "hostB", "contended")]),
        ];
        assert!(combine(results).is_empty());
    }

    #[test]
    fn combine_is_order_independent_when_hosts_agree() {
        let forward = vec![
            ("a_step".to_string(), vec![cand("vm1", "hostA", "r1")]),
            ("b_step".to_string(), vec![cand("vm1", "hostA", "r2")]),
        ];
        let backward = vec![
            ("b_step".to_string(), vec![cand("vm1", "hostA", "r2")]),
            ("a_step".to_string(), vec![cand("vm1", "hostA", "r1")]),
        ];
        assert_eq!(combine(forward), combine(backward));
    }
}
