//! Centralized storage for metrics about the advice generator's pass loop
//! (spec.md §4.9 `Diagnostics`). One [`MetricsCollector`] is shared across requests;
//! callers fold each request's [`crate::core::objects::Diagnostics`] into it via
//! [`MetricsCollector::record_request`].

use average::{concatenate, Estimate, Max, Mean, Min, Variance};

use crate::core::objects::Diagnostics;

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

#[derive(Debug, Default)]
pub struct EstimatorWrapper {
    estimator: Estimator,
}

impl std::fmt::Debug for Estimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("mean", &self.mean)
            .field("population_variance", &self.population_variance)
            .finish()
    }
}

impl EstimatorWrapper {
    pub fn new() -> Self {
        Self { estimator: Estimator::new() }
    }

    pub fn add(&mut self, value: f64) {
        self.estimator.add(value);
    }

    pub fn min(&self) -> f64 {
        self.estimator.min()
    }

    pub fn max(&self) -> f64 {
        self.estimator.max()
    }

    pub fn mean(&self) -> f64 {
        self.estimator.mean()
    }

    pub fn population_variance(&self) -> f64 {
        self.estimator.population_variance()
    }
}

impl PartialEq for EstimatorWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.min() == other.min() && self.max() == other.max() && self.mean() == other.mean() && self.population_variance() == other.population_variance()
    }
}

/// Running counters and latency estimations across every scaling-advice request this
/// process has served. None of this is persisted; it lives for the process lifetime
/// and is printed on demand (see [`crate::metrics::printer`]).
#[derive(Default)]
pub struct MetricsCollector {
    /// Total `POST /scaling-advice` requests handled, successful or not.
    pub requests_total: u64,
    /// Requests that produced at least one `TerminalAdvice` with consolidated items.
    pub requests_with_advice: u64,
    /// Requests that failed outright (no unscheduled pods, no scaling advice possible,
    /// or a scorer/scheduler error) and were surfaced as a terminal `Error` event.
    pub requests_failed: u64,
    /// Sum of `diagnostics.passes` across every successful request.
    pub total_passes: u64,
    /// Sum of `diagnostics.simulations_run` across every successful request.
    pub total_simulations_run: u64,

    /// Estimations over each request's `diagnostics.passes`.
    pub passes_stats: EstimatorWrapper,
    /// Estimations over each request's `diagnostics.simulations_run`.
    pub simulations_run_stats: EstimatorWrapper,
    /// Estimations over each request's end-to-end wall-clock time, in milliseconds.
    pub elapsed_ms_stats: EstimatorWrapper,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a completed request's diagnostics into the running totals. Called once
    /// per request that reached a `TerminalAdvice`.
    pub fn record_request(&mut self, diagnostics: &Diagnostics) {
        self.requests_total += 1;
        self.requests_with_advice += 1;
        self.total_passes += diagnostics.passes as u64;
        self.total_simulations_run += diagnostics.simulations_run as u64;
        self.passes_stats.add(diagnostics.passes as f64);
        self.simulations_run_stats.add(diagnostics.simulations_run as f64);
        self.elapsed_ms_stats.add(diagnostics.elapsed_ms as f64);
    }

    /// Records a request that failed before producing any scaling advice.
    pub fn record_failure(&mut self) {
        self.requests_total += 1;
        self.requests_failed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_folds_diagnostics_into_totals() {
        let mut collector = MetricsCollector::new();
        collector.record_request(&Diagnostics { passes: 3, simulations_run: 12, elapsed_ms: 42 });
        collector.record_request(&Diagnostics { passes: 1, simulations_run: 4, elapsed_ms: 8 });

        assert_eq!(collector.requests_total, 2);
        assert_eq!(collector.requests_with_advice, 2);
        assert_eq!(collector.total_passes, 4);
        assert_eq!(collector.total_simulations_run, 16);
        assert_eq!(collector.passes_stats.max(), 3.0);
        assert_eq!(collector.elapsed_ms_stats.min(), 8.0);
    }

    #[test]
    fn record_failure_only_touches_totals() {
        let mut collector = MetricsCollector::new();
        collector.record_failure();
        assert_eq!(collector.requests_total, 1);
        assert_eq!(collector.requests_failed, 1);
        assert_eq!(collector.requests_with_advice, 0);
    }
}
