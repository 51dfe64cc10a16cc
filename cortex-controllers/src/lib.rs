//! Reconciliation controllers (spec §4.4-§4.7): Decision, Descheduling,
//! Reservation, Pipeline rebuild, and KPI, plus the generic work-queue
//! runtime and the collaborator traits that decouple these controllers
//! from the concrete OpenStack/Postgres clients a deployment wires in.

pub mod collaborators;
pub mod datasource;
pub mod decision;
pub mod descheduling;
pub mod kpi;
pub mod migration_history;
pub mod openstack_stub;
pub mod pipeline_watch;
pub mod queue;
pub mod reservation;
pub mod reservation_lookup;
pub mod secret;

pub use collaborators::{Hypervisor, HypervisorLookup, NovaMigrator, NovaServerLookup, ReservationScheduler, ServerState};
pub use datasource::DatasourceController;
pub use decision::{DecisionCleanup, DecisionController, DecisionOutcome, PendingRequests};
pub use descheduling::{DeschedulingExecutor, DeschedulingRunner, DeschedulingTtlCleanup};
pub use kpi::{KpiWatcher, StoreDependencySource};
pub use migration_history::StoreMigrationHistory;
pub use openstack_stub::UnconfiguredOpenStack;
pub use pipeline_watch::{PipelineManager, PipelineWatcher};
pub use queue::{jittered, WorkQueue};
pub use reservation::{InProcessReservationScheduler, ReservationController};
pub use reservation_lookup::StoreReservationLookup;
pub use secret::StoreSecretResolver;
