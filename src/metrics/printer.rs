use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

use prettytable::{row, Table};
use serde::{Deserialize, Serialize};

use crate::metrics::collector::MetricsCollector;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    JSON,
    PrettyTable,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetricsPrinterConfig {
    pub format: OutputFormat,
    pub output_file: std::path::PathBuf,
}

/// Writes the process-lifetime metrics `collector` holds to `config.output_file` in
/// the configured format. Called once, on server shutdown (spec.md §6 "Generated
/// files" — this crate extends that with a metrics dump alongside the kubeconfig).
pub fn print_metrics(collector: Arc<Mutex<MetricsCollector>>, config: &MetricsPrinterConfig) {
    match config.format {
        OutputFormat::PrettyTable => print_metrics_as_pretty_table(collector, &config.output_file),
        OutputFormat::JSON => print_metrics_as_json(collector, &config.output_file),
    }
}

pub fn print_metrics_as_pretty_table(collector: Arc<Mutex<MetricsCollector>>, output_file: &std::path::PathBuf) {
    let metrics = collector.lock().expect("metrics lock poisoned");
    let mut metrics_file = File::create(output_file).unwrap();

    let mut aggregated_table = Table::new();
    aggregated_table.add_row(row!["Metric", "Count"]);
    aggregated_table.add_row(row!["Requests total", metrics.requests_total]);
    aggregated_table.add_row(row!["Requests with advice", metrics.requests_with_advice]);
    aggregated_table.add_row(row!["Requests failed", metrics.requests_failed]);
    aggregated_table.add_row(row!["Total passes", metrics.total_passes]);
    aggregated_table.add_row(row!["Total simulations run", metrics.total_simulations_run]);

    let mut stats_table = Table::new();
    stats_table.add_row(row!["Metric", "Min", "Max", "Mean", "Variance"]);
    stats_table.add_row(row![
        "Passes per request",
        metrics.passes_stats.min(),
        metrics.passes_stats.max(),
        metrics.passes_stats.mean(),
        metrics.passes_stats.population_variance()
    ]);
    stats_table.add_row(row![
        "Simulations per request",
        metrics.simulations_run_stats.min(),
        metrics.simulations_run_stats.max(),
        metrics.simulations_run_stats.mean(),
        metrics.simulations_run_stats.population_variance()
    ]);
    stats_table.add_row(row![
        "Elapsed ms per request",
        metrics.elapsed_ms_stats.min(),
        metrics.elapsed_ms_stats.max(),
        metrics.elapsed_ms_stats.mean(),
        metrics.elapsed_ms_stats.population_variance()
    ]);

    let _ = aggregated_table.print(&mut metrics_file);
    let _ = stats_table.print(&mut metrics_file);
}

#[derive(Serialize)]
struct MetricsJSON {
    counters: Counters,
    timings: Timings,
}

#[derive(Serialize)]
struct Counters {
    requests_total: u64,
    requests_with_advice: u64,
    requests_failed: u64,
    total_passes: u64,
    total_simulations_run: u64,
}

#[derive(Serialize)]
struct Timings {
    passes_per_request: TimingsStats,
    simulations_per_request: TimingsStats,
    elapsed_ms_per_request: TimingsStats,
}

#[derive(Serialize)]
struct TimingsStats {
    min: f64,
    max: f64,
    mean: f64,
    variance: f64,
}

pub fn print_metrics_as_json(collector: Arc<Mutex<MetricsCollector>>, output_file: &std::path::PathBuf) {
    let metrics = collector.lock().expect("metrics lock poisoned");
    let mut metrics_file = File::create(output_file).unwrap();

    let metrics = MetricsJSON {
        counters: Counters {
            requests_total: metrics.requests_total,
            requests_with_advice: metrics.requests_with_advice,
            requests_failed: metrics.requests_failed,
            total_passes: metrics.total_passes,
            total_simulations_run: metrics.total_simulations_run,
        },
        timings: Timings {
            passes_per_request: TimingsStats {
                min: metrics.passes_stats.min(),
                max: metrics.passes_stats.max(),
                mean: metrics.passes_stats.mean(),
                variance: metrics.passes_stats.population_variance(),
            },
            simulations_per_request: TimingsStats {
                min: metrics.simulations_run_stats.min(),
                max: metrics.simulations_run_stats.max(),
                mean: metrics.simulations_run_stats.mean(),
                variance: metrics.simulations_run_stats.population_variance(),
            },
            elapsed_ms_per_request: TimingsStats {
                min: metrics.elapsed_ms_stats.min(),
                max: metrics.elapsed_ms_stats.max(),
                mean: metrics.elapsed_ms_stats.mean(),
                variance: metrics.elapsed_ms_stats.population_variance(),
            },
        },
    };

    let serialized_json = serde_json::to_string_pretty(&metrics).unwrap();
    metrics_file.write_all(serialized_json.as_bytes()).unwrap();
}
