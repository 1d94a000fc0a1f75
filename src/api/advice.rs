//! HTTP entry point for the advice generator (C9), wired over the shared scheduler
//! launcher and scoring configuration (spec.md §4.9 / §6).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{web, HttpResponse};

use crate::core::objects::{ScalingAdviceEvent, ScalingAdviceRequest};
use crate::generator::{self, GeneratorDeps};
use crate::metrics::collector::MetricsCollector;
use crate::scheduler::SchedulerLauncher;
use crate::simulation::scoring::{strategy_pair, ScoreWeights, ScoringStrategy};
use crate::simulation::simulation::StabilizationConfig;
use crate::view::SandboxRegistry;

/// Per-request generator configuration, cloned from configuration defaults (spec.md
/// §6 `scoring.strategy`/`scoring.weights`/`advice.generationMode`). Carries the
/// shared [`SchedulerLauncher`] rather than constructing a fresh one per request,
/// since the launcher owns the bounded `simulation.maxConcurrent` semaphore.
#[derive(Clone)]
pub struct AdviceSettings {
    pub launcher: Arc<SchedulerLauncher>,
    pub strategy: ScoringStrategy,
    pub weights: ScoreWeights,
    pub stabilization: StabilizationConfig,
    pub watch_queue_size: usize,
    pub generation_mode: generator::GenerationMode,
    pub metrics: Arc<Mutex<MetricsCollector>>,
}

impl AdviceSettings {
    fn deps(&self, registry: Option<Arc<dyn SandboxRegistry>>) -> GeneratorDeps {
        let (scorer, selector) = strategy_pair(self.strategy, self.weights.clone());
        GeneratorDeps {
            launcher: self.launcher.clone(),
            scorer,
            selector,
            stabilization: self.stabilization,
            watch_queue_size: self.watch_queue_size,
            registry,
        }
    }
}

impl Default for AdviceSettings {
    fn default() -> Self {
        Self {
            launcher: Arc::new(SchedulerLauncher::new(
                4,
                Arc::new(crate::scheduler::DefaultScheduler::default()),
                Duration::from_millis(50),
            )),
            strategy: ScoringStrategy::LeastWaste,
            weights: ScoreWeights::default(),
            stabilization: StabilizationConfig::default(),
            watch_queue_size: 64,
            generation_mode: generator::GenerationMode::Incremental,
            metrics: Arc::new(Mutex::new(MetricsCollector::new())),
        }
    }
}

/// `POST /{view}/scaling-advice`: runs the pass loop and returns the full event
/// sequence as a JSON array. Streaming the events one-at-a-time as they're produced
/// is left to a future transport; this endpoint is the synchronous "pull" shape
/// spec.md §3 allows ("implementers may choose push or pull").
pub async fn generate_scaling_advice(
    settings: web::Data<AdviceSettings>,
    state: web::Data<crate::api::state::AppState>,
    body: web::Json<ScalingAdviceRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let registry: Arc<dyn SandboxRegistry> = state.into_inner();
    match generator::generate_advice_mode(&request, settings.deps(Some(registry)), settings.generation_mode).await {
        Ok(events) => {
            if let Some(ScalingAdviceEvent::TerminalAdvice { diagnostics: Some(diagnostics), .. }) = events.last() {
                settings.metrics.lock().expect("metrics lock poisoned").record_request(diagnostics);
            }
            HttpResponse::Ok().json(events)
        }
        Err(err) => {
            settings.metrics.lock().expect("metrics lock poisoned").record_failure();
            let event: ScalingAdviceEvent = (&err).into();
            HttpResponse::Ok().json(vec![event])
        }
    }
}
