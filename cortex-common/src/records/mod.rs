//! The declarative resource surface (spec §3/§6): one module per record
//! kind, each with a `spec` and a `status` sub-object.

pub mod datasource;
pub mod decision;
pub mod descheduling;
pub mod kpi;
pub mod knowledge;
pub mod pipeline;
pub mod reservation;
pub mod secret;
pub mod step;

pub use datasource::Datasource;
pub use decision::Decision;
pub use descheduling::Descheduling;
pub use kpi::Kpi;
pub use knowledge::Knowledge;
pub use pipeline::Pipeline;
pub use reservation::Reservation;
pub use secret::Secret;
pub use step::Step;

/// Every record kind has a stable string key used for store key-prefixes
/// (`/registry/<kind>/<name>`) and for log/metric labels.
pub trait RecordKind {
    const KIND: &'static str;
}

/// Every record carries an `ObjectMeta`; the store uses this to stamp the
/// etcd mod-revision back onto a freshly decoded record without each
/// record kind wiring that up by hand.
pub trait WithMeta {
    fn meta(&self) -> &crate::meta::ObjectMeta;
    fn meta_mut(&mut self) -> &mut crate::meta::ObjectMeta;
}

macro_rules! impl_record_kind {
    ($ty:ty, $kind:literal) => {
        impl RecordKind for $ty {
            const KIND: &'static str = $kind;
        }

        impl WithMeta for $ty {
            fn meta(&self) -> &crate::meta::ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut crate::meta::ObjectMeta {
                &mut self.meta
            }
        }
    };
}

impl_record_kind!(Pipeline, "pipelines");
impl_record_kind!(Step, "steps");
impl_record_kind!(Decision, "decisions");
impl_record_kind!(Descheduling, "deschedulings");
impl_record_kind!(Reservation, "reservations");
impl_record_kind!(Kpi, "kpis");
impl_record_kind!(Knowledge, "knowledges");
impl_record_kind!(Datasource, "datasources");
impl_record_kind!(Secret, "secrets");
