use std::collections::HashMap;

use cortex_common::wire;

/// A placement candidate — a compute host, a storage pool, or a
/// Kubernetes node (glossary "Subject").
pub type Subject = String;

/// Type-specific payload carried by a request. Kept as a single tagged
/// sum type (per the "Polymorphic step over many request kinds" design
/// note) so the pipeline engine and the two hot capabilities
/// (`subjects`/`weights`) stay request-agnostic, while steps that do care
/// about the concrete workload (e.g. the capacity filter) match on the
/// variant they need.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    NovaServer(wire::NovaSpecData),
    Pod(wire::Pod),
    ManilaShare(wire::ManilaShareRequest),
    CinderVolume(wire::CinderVolumeRequest),
    /// Used by tests and by the Reservation controller's synthesized
    /// request, which only needs capacity/project matching, not a full
    /// external payload.
    Synthetic {
        project_id: Option<String>,
        flavor_name: Option<String>,
        vcpus: u64,
        memory_mb: u64,
    },
}

impl RequestPayload {
    pub fn project_id(&self) -> Option<&str> {
        match self {
            RequestPayload::NovaServer(d) => Some(d.project_id.as_str()),
            RequestPayload::Pod(_) => None,
            RequestPayload::ManilaShare(r) => Some(r.project_id.as_str()),
            RequestPayload::CinderVolume(r) => Some(r.project_id.as_str()),
            RequestPayload::Synthetic { project_id, .. } => project_id.as_deref(),
        }
    }

    pub fn flavor_name(&self) -> Option<&str> {
        match self {
            RequestPayload::NovaServer(d) => Some(d.flavor.data.name.as_str()),
            RequestPayload::Synthetic { flavor_name, .. } => flavor_name.as_deref(),
            _ => None,
        }
    }

    /// Requested vcpus/memory in the engine's native units (whole vcpus,
    /// megabytes). Non-compute requests (pods, Manila, Cinder) report 0;
    /// the capacity filter only scopes itself to Nova-server requests.
    pub fn requested_vcpus(&self) -> u64 {
        match self {
            RequestPayload::NovaServer(d) => d.flavor.data.vcpus,
            RequestPayload::Synthetic { vcpus, .. } => *vcpus,
            _ => 0,
        }
    }

    pub fn requested_memory_mb(&self) -> u64 {
        match self {
            RequestPayload::NovaServer(d) => d.flavor.data.memory_mb,
            RequestPayload::Synthetic { memory_mb, .. } => *memory_mb,
            _ => 0,
        }
    }

    pub fn hypervisor_type_hint(&self) -> Option<&str> {
        match self {
            RequestPayload::NovaServer(d) => d
                .flavor
                .data
                .extra_specs
                .get("capabilities:hypervisor_type")
                .map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Runtime value describing a workload and a candidate subject set,
/// created by a dispatcher and discarded after a pipeline run (spec §3
/// "PipelineRequest"). Not persisted.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    subjects: Vec<Subject>,
    weights: HashMap<Subject, f64>,
    pub payload: RequestPayload,
}

impl PipelineRequest {
    /// `weights` must have exactly one entry per subject; missing
    /// entries default to 0.0 (spec §3 invariant "each subject in the
    /// set has exactly one weight").
    pub fn new(subjects: Vec<Subject>, weights: HashMap<Subject, f64>, payload: RequestPayload) -> Self {
        let weights = subjects
            .iter()
            .map(|s| (s.clone(), weights.get(s).copied().unwrap_or(0.0)))
            .collect();
        Self {
            subjects,
            weights,
            payload,
        }
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn weights(&self) -> &HashMap<Subject, f64> {
        &self.weights
    }

    /// The view presented to the next step: only the subjects still
    /// alive, carrying their existing weights forward (spec §4.2 step 2,
    /// "filter semantics").
    pub fn with_subjects(&self, subjects: Vec<Subject>) -> Self {
        let weights = subjects
            .iter()
            .map(|s| (s.clone(), self.weights.get(s).copied().unwrap_or(0.0)))
            .collect();
        Self {
            subjects,
            weights,
            payload: self.payload.clone(),
        }
    }
}
