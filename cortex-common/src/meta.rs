use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scopes which controller replica owns a given record, so multiple Cortex
/// instances can run side by side against the same store (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operator(pub String);

impl Operator {
    pub fn matches(&self, other: &Operator) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a secret holding credentials (DB DSN, Keystone creds,
/// MQTT broker auth). The core never reads these directly; it resolves
/// them through the store (spec §6 "Environment/config").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub key: String,
}

/// Metadata carried by every persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub operator: Operator,
    pub created_at: DateTime<Utc>,
    /// Bumped on every spec change; controllers compare this to decide
    /// whether a rebuild is needed.
    pub generation: u64,
    /// The etcd mod-revision backing this record, used both for
    /// optimistic-concurrency status writes and as a watch resume token.
    pub resource_version: i64,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, operator: Operator) -> Self {
        Self {
            name: name.into(),
            operator,
            created_at: Utc::now(),
            generation: 1,
            resource_version: 0,
        }
    }
}

/// Condition type names used on `status.conditions` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    Error,
    Waiting,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionStatus(pub bool);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition: DateTime<Utc>,
}

impl Condition {
    pub fn new(type_: ConditionType, status: bool, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_,
            status: ConditionStatus(status),
            reason: reason.into(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }
}

/// Upserts a condition of the same `type_`, replacing its value and
/// bumping `last_transition` only when the status actually changed.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status != new.status {
            existing.last_transition = new.last_transition;
        }
        existing.status = new.status;
        existing.reason = new.reason;
        existing.message = new.message;
    } else {
        conditions.push(new);
    }
}

pub fn has_condition(conditions: &[Condition], type_: ConditionType, status: bool) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status.0 == status)
}
