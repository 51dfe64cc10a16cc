use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta};

/// Which flavor of engine run a Pipeline drives (spec §3 "Pipeline").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineType {
    FilterWeigher,
    Descheduler,
}

/// A reference to a `Step` record by name, in the order the step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(rename = "type")]
    pub type_: PipelineType,
    pub steps: Vec<StepRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub conditions: Vec<Condition>,
}

/// Identifies an ordered sequence of steps plus a type tag and operator
/// scope. Immutable except for status (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub meta: ObjectMeta,
    pub spec: PipelineSpec,
    #[serde(default)]
    pub status: PipelineStatus,
}
