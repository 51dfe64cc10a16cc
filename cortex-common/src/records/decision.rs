use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// Which external scheduler this Decision originated from (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionType {
    NovaServer,
    CinderVolume,
    Pod,
    ManilaShare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSpec {
    #[serde(rename = "type")]
    pub type_: DecisionType,
    pub pipeline_ref: String,
    /// Opaque raw request payload, decoded by the Decision reconciler into
    /// the type-specific `PipelineRequest` once the pipeline is resolved.
    pub raw_request: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionStatus {
    pub ordered_hosts: Vec<String>,
    pub target: Option<String>,
    #[serde(with = "duration_millis", default)]
    pub took: Duration,
    pub error: Option<String>,
    pub raw_input_weights: HashMap<String, f64>,
    pub normalized_input_weights: HashMap<String, f64>,
    pub aggregated_weights: HashMap<String, f64>,
}

/// A persisted request/response artefact (spec §3 "Decision").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub meta: ObjectMeta,
    pub spec: DecisionSpec,
    #[serde(default)]
    pub status: DecisionStatus,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
