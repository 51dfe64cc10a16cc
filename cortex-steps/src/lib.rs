//! Built-in filter and weigher steps, and the process-wide registry that
//! maps a Step record's `impl` key to a constructor (spec §3 "Step" /
//! §4.1 "registered plugin key").

pub mod capacity;
pub mod descheduler_contention;
pub mod pinned_projects;
pub mod registry;
pub mod utilization;

pub use registry::{register_builtin_descheduling_steps, register_builtin_steps, DeschedulingStepConstructor, DeschedulingStepRegistry, Registry, StepConstructor};
