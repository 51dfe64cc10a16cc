use std::sync::OnceLock;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Process-wide metrics registry (spec §9 "Global metrics registry" —
/// "pass an explicit registry into each constructor"). Collectors
/// register on Init and unregister on Deinit so registration state is a
/// direct function of dependency readiness (spec §8 invariant 10).
pub struct CortexMetrics {
    registry: Registry,
    pub decision_total: IntCounterVec,
    pub decision_duration_seconds: Histogram,
    pub descheduling_outcomes_total: IntCounterVec,
    pub kpi_registered: IntGaugeVec,
    pub reconcile_errors_total: IntCounterVec,
}

static METRICS: OnceLock<CortexMetrics> = OnceLock::new();

fn build() -> CortexMetrics {
    let registry = Registry::new();

    let decision_total = IntCounterVec::new(
        Opts::new("cortex_decision_total", "Total number of scheduling decisions by kind and outcome"),
        &["kind", "outcome"],
    )
    .expect("failed to create cortex_decision_total");

    let decision_duration_seconds = Histogram::with_opts(
        HistogramOpts::new("cortex_decision_duration_seconds", "Pipeline run duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("failed to create cortex_decision_duration_seconds");

    let descheduling_outcomes_total = IntCounterVec::new(
        Opts::new("cortex_descheduling_outcomes_total", "Descheduling candidates by outcome"),
        &["outcome"],
    )
    .expect("failed to create cortex_descheduling_outcomes_total");

    let kpi_registered = IntGaugeVec::new(
        Opts::new("cortex_kpi_registered", "1 if a KPI's plugin/collector is currently registered"),
        &["kpi"],
    )
    .expect("failed to create cortex_kpi_registered");

    let reconcile_errors_total = IntCounterVec::new(
        Opts::new("cortex_reconcile_errors_total", "Reconcile errors by controller and error class"),
        &["controller", "class"],
    )
    .expect("failed to create cortex_reconcile_errors_total");

    let register = |collector: Box<dyn prometheus::core::Collector>, name: &'static str| {
        if let Err(e) = registry.register(collector) {
            log::warn!("failed to register metric {name}: {e}");
        }
    };

    register(Box::new(decision_total.clone()), "cortex_decision_total");
    register(Box::new(decision_duration_seconds.clone()), "cortex_decision_duration_seconds");
    register(Box::new(descheduling_outcomes_total.clone()), "cortex_descheduling_outcomes_total");
    register(Box::new(kpi_registered.clone()), "cortex_kpi_registered");
    register(Box::new(reconcile_errors_total.clone()), "cortex_reconcile_errors_total");

    CortexMetrics {
        registry,
        decision_total,
        decision_duration_seconds,
        descheduling_outcomes_total,
        kpi_registered,
        reconcile_errors_total,
    }
}

pub fn metrics() -> &'static CortexMetrics {
    METRICS.get_or_init(build)
}

pub fn gather_text() -> Result<String, String> {
    let metrics = metrics();
    let families = metrics.registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|e| format!("failed to encode metrics: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics are not valid utf8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_export_contains_expected_families() {
        metrics().decision_total.with_label_values(&["nova", "success"]).inc();
        let text = gather_text().unwrap();
        assert!(text.contains("cortex_decision_total"));
    }
}
