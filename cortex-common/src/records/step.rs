use serde::{Deserialize, Serialize};

use crate::meta::{Condition, ObjectMeta, SecretRef};

/// Capability/spec-based restriction narrowing which hosts a step
/// evaluates (spec §4.3 "Scoper").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeSpec {
    pub any_of_trait_infixes: Vec<String>,
    pub all_of_trait_infixes: Vec<String>,
    pub any_of_hypervisor_type_infixes: Vec<String>,
    pub all_of_flavor_name_infixes: Vec<String>,
    #[serde(default)]
    pub invert_selection: bool,
}

impl ScopeSpec {
    /// A scope with every selector empty matches everything (the
    /// "unscoped" default).
    pub fn is_empty(&self) -> bool {
        self.any_of_trait_infixes.is_empty()
            && self.all_of_trait_infixes.is_empty()
            && self.any_of_hypervisor_type_infixes.is_empty()
            && self.all_of_flavor_name_infixes.is_empty()
    }
}

/// Disables individual Validator checks for a weigher step (spec §3
/// "Step" / §4.3 "Validator").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisabledValidations {
    #[serde(default)]
    pub subject_set_unchanged: bool,
    #[serde(default)]
    pub some_subjects_remain: bool,
}

/// Whether a step only removes subjects (Filter) or only adjusts
/// activations without shrinking the candidate set (Weigher). Drives the
/// Validator's "subject_set_unchanged" check (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Filter,
    Weigher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// The registered plugin key (cortex-steps registry).
    pub impl_: String,
    pub kind: StepKind,
    #[serde(default)]
    pub options: serde_json::Value,
    pub database_secret_ref: Option<SecretRef>,
    #[serde(default)]
    pub scope: ScopeSpec,
    #[serde(default)]
    pub disabled_validations: DisabledValidations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepStatus {
    pub conditions: Vec<Condition>,
}

/// Identifies an impl, options blob, optional DB secret reference, scope,
/// and disabled-validations struct (spec §3 "Step").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub meta: ObjectMeta,
    pub spec: StepSpec,
    #[serde(default)]
    pub status: StepStatus,
}
