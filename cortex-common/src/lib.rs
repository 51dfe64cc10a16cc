//! Shared record types, conditions, and the error taxonomy used across the
//! Cortex crates. Mirrors the declarative resource surface described for
//! the control plane: every record has a `spec` and a `status`, and every
//! controller scopes its writes to records whose `operator` tag matches.

pub mod error;
pub mod meta;
pub mod records;
pub mod wire;

pub use error::CortexError;
pub use meta::{Operator, SecretRef};
