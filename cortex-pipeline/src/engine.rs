use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cortex_common::CortexError;

use crate::cycle_state::CycleState;
use crate::request::{PipelineRequest, Subject};
use crate::step::Step;
use crate::weight;

/// Per-run audit trail plus the final ordering, exactly the four things
/// a Decision's status records (spec §3 "Decision" / §4.2 step 5).
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub ordered_subjects: Vec<Subject>,
    pub target: Option<Subject>,
    pub raw_weights: HashMap<Subject, f64>,
    pub normalized_weights: HashMap<Subject, f64>,
    pub aggregated_weights: HashMap<Subject, f64>,
    pub took: Duration,
}

/// An ordered composition of steps applied to a request (spec §4.2). For
/// filter-weigher pipelines, steps run strictly sequentially: each one
/// observes the filtered state of the prior (spec §5 "Ordering
/// guarantees").
pub struct Pipeline {
    pub name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Step>>) -> Self {
        Self { name: name.into(), steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Releases every step's resources (spec §4.4 "Pipeline rebuild":
    /// "Deinit the previous instance afterwards"). Callers are
    /// responsible for waiting until no in-flight `run` still holds this
    /// instance, since `Deinit` would otherwise race a live Run.
    pub async fn deinit_all(&self) {
        for step in &self.steps {
            step.deinit().await;
        }
    }

    pub async fn run(&self, initial: PipelineRequest) -> Result<PipelineOutcome, CortexError> {
        let started = Instant::now();
        let raw_weights = initial.weights().clone();
        let normalized_weights = weight::normalize(&raw_weights);
        let insertion_order: Vec<Subject> = initial.subjects().to_vec();

        let mut current = PipelineRequest::new(
            initial.subjects().to_vec(),
            normalized_weights.clone(),
            initial.payload.clone(),
        );
        let mut cycle = CycleState::new();
        let mut per_step_activations: Vec<HashMap<Subject, f64>> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if current.subjects().is_empty() {
                // Nothing left to evaluate; later steps legitimately see an
                // empty set and the validator (some_subjects_remain) has
                // already fired for the step that emptied it.
                per_step_activations.push(HashMap::new());
                continue;
            }
            match step.run(&current, &mut cycle).await {
                Ok(result) => {
                    let alive = result.surviving_subjects();
                    per_step_activations.push(result.activations.clone());
                    current = current.with_subjects(alive);
                }
                Err(e) if e.is_skip() => {
                    per_step_activations.push(HashMap::new());
                }
                Err(e) => return Err(e),
            }
        }

        let aggregated_all = weight::aggregate(&normalized_weights, &per_step_activations);
        let surviving: HashSet<&Subject> = current.subjects().iter().collect();
        let aggregated_weights: HashMap<Subject, f64> = aggregated_all
            .into_iter()
            .filter(|(subject, _)| surviving.contains(subject))
            .collect();

        let ordered_subjects = weight::sort_descending(&aggregated_weights, &insertion_order);
        let target = ordered_subjects.first().cloned();

        Ok(PipelineOutcome {
            ordered_subjects,
            target,
            raw_weights,
            normalized_weights,
            aggregated_weights,
            took: started.elapsed(),
        })
    }
}
