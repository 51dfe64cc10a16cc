//! A generic declarative-record store and watch stream over etcd/Xline
//! (spec §6 "Store"), the control plane's single source of truth.
//! Every record kind shares one client and one key convention
//! (`/registry/<kind>/<name>`) through `RecordKind`/`WithMeta`, rather
//! than one hand-written accessor method per kind as the teacher's
//! `XlineStore` has for pods and nodes.

pub mod client;
pub mod operator_filter;
pub mod watch;

pub use client::StoreClient;
pub use watch::{RecordEvent, WatchHandle};
