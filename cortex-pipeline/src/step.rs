use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_common::{CortexError, SecretRef};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::cycle_state::CycleState;
use crate::knowledge_db::{DbResolver, KnowledgeDb};
use crate::request::{PipelineRequest, Subject};

/// A single observability statistic reported by a step for one subject,
/// used only for the Monitor wrapper's impact metric (spec §3
/// "StepResult").
#[derive(Debug, Clone, Copy)]
pub struct StatValue {
    pub value: f64,
    pub unit: &'static str,
}

/// Produced by one step (spec §3 "StepResult"). A subject absent from
/// `activations` is filtered out; a subject present with activation `a`
/// contributes `tanh(a)` to its cumulative weight.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub activations: HashMap<Subject, f64>,
    pub stats: HashMap<Subject, HashMap<String, StatValue>>,
}

impl StepResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, subject: Subject, activation: f64) {
        self.activations.insert(subject, activation);
    }

    pub fn set_stat(&mut self, subject: &Subject, name: impl Into<String>, value: f64, unit: &'static str) {
        self.stats
            .entry(subject.clone())
            .or_default()
            .insert(name.into(), StatValue { value, unit });
    }

    /// The subject set this result keeps alive. Every key here must have
    /// been a subject of the input request (spec §3 invariant).
    pub fn surviving_subjects(&self) -> Vec<Subject> {
        self.activations.keys().cloned().collect()
    }
}

/// Options and optional DB secret ref handed to a step at `Init` time
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct StepInitContext {
    pub options: serde_json::Value,
    pub database_secret_ref: Option<SecretRef>,
}

/// The generic step interface (spec §4.1). Every step exposes a stable
/// name plus the `Init`/`Run`/`Deinit` lifecycle. `Init` MUST be
/// idempotent: a re-Init replaces prior state atomically, Deinit'ing the
/// old resources first.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError>;

    /// Contract: (i) every activation key was a subject of `request`;
    /// (ii) absence means filtered; (iii) MUST NOT mutate `request`;
    /// (iv) on configuration misuse return an error; (v) returning
    /// `CortexError::skip()` is tolerated by the pipeline as a no-op.
    ///
    /// `cycle` is per-run scratch space threaded sequentially through
    /// every step invocation (scope ▸ validate ▸ monitor ▸ impl); plain
    /// steps ignore it, the Monitor wrapper uses it to remember the
    /// running cumulative weight between steps (spec §4.3 "Monitor").
    async fn run(&self, request: &PipelineRequest, cycle: &mut CycleState) -> Result<StepResult, CortexError>;

    async fn deinit(&self);
}

struct BaseStepState {
    options: serde_json::Value,
    db: Option<Arc<dyn KnowledgeDb>>,
}

/// The standard implementation of options decoding, DB connection from a
/// secret ref, and `prepare_result`, which seeds `Activations` with every
/// subject mapped to 0.0 — the "include-all" starting point (spec §4.1).
/// Concrete steps embed a `BaseStep` and delegate `init`/`deinit` to it.
pub struct BaseStep {
    name: String,
    state: RwLock<Option<BaseStepState>>,
}

impl BaseStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn init(&self, ctx: StepInitContext, resolver: &dyn DbResolver) -> Result<(), CortexError> {
        let db = match &ctx.database_secret_ref {
            Some(secret_ref) => Some(resolver.resolve(secret_ref).await?),
            None => None,
        };
        // Build the replacement before taking the write lock so a failed
        // resolve never clobbers still-live state (Init is idempotent).
        let mut guard = self.state.write().await;
        if let Some(prev) = guard.take() {
            drop(prev.db); // old DB handle's Drop releases pooled resources
        }
        *guard = Some(BaseStepState {
            options: ctx.options,
            db,
        });
        Ok(())
    }

    pub async fn deinit(&self) {
        *self.state.write().await = None;
    }

    pub async fn options<T: DeserializeOwned>(&self) -> Result<T, CortexError> {
        let guard = self.state.read().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| CortexError::Configuration(format!("step {} not initialized", self.name)))?;
        serde_json::from_value(state.options.clone())
            .map_err(|e| CortexError::Configuration(format!("step {}: invalid options: {e}", self.name)))
    }

    pub async fn db(&self) -> Result<Arc<dyn KnowledgeDb>, CortexError> {
        let guard = self.state.read().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| CortexError::Configuration(format!("step {} not initialized", self.name)))?;
        state
            .db
            .clone()
            .ok_or_else(|| CortexError::Configuration(format!("step {} has no database configured", self.name)))
    }

    pub fn prepare_result(&self, request: &PipelineRequest) -> StepResult {
        StepResult {
            activations: request.subjects().iter().cloned().map(|s| (s, 0.0)).collect(),
            stats: HashMap::new(),
        }
    }
}
