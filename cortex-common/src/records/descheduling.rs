use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// The kind of reference being descheduled / previously hosted on
/// (currently only Nova servers and compute hosts are supported, spec
/// §4.5 "validate refType/prevHostType").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefType {
    NovaServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostType {
    ComputeHost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeschedulingSpec {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub ref_type: RefType,
    pub prev_host: String,
    pub prev_host_type: HostType,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeschedulingPhase {
    Queued,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeschedulingStatus {
    pub phase: DeschedulingPhase,
    pub error: Option<String>,
    pub new_host: Option<String>,
}

impl Default for DeschedulingStatus {
    fn default() -> Self {
        Self {
            phase: DeschedulingPhase::Queued,
            error: None,
            new_host: None,
        }
    }
}

impl DeschedulingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            DeschedulingPhase::Completed | DeschedulingPhase::Failed
        )
    }
}

/// A persisted artefact proposing that one VM be moved off its current
/// host (spec §3 "Descheduling").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descheduling {
    pub meta: ObjectMeta,
    pub spec: DeschedulingSpec,
    #[serde(default)]
    pub status: DeschedulingStatus,
}
