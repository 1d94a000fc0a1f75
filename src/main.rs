use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};

use scaling_advisor::api::advice::AdviceSettings;
use scaling_advisor::api::AppState;
use scaling_advisor::config::Config;
use scaling_advisor::errors::InitError;
use scaling_advisor::kubeconfig::Kubeconfig;
use scaling_advisor::scheduler::{DefaultScheduler, SchedulerLauncher};
use scaling_advisor::simulation::simulation::StabilizationConfig;
use scaling_advisor::view::base::BaseView;

#[derive(Parser)]
#[command(name = "scaling-advisor", about = "Surrogate Kubernetes API server and scale-out advisor")]
struct Cli {
    /// Path to a YAML or JSON configuration document (spec.md §6).
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the API server (default when no subcommand is given).
    Serve,
    /// Writes the kubeconfig document for the base view and exits, without starting the server.
    WriteKubeconfig {
        #[arg(short, long, default_value = "kubeconfig.yaml")]
        output: String,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        log::warn!("failed to load config from {}: {e}, falling back to defaults", cli.config);
        Config::default()
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::WriteKubeconfig { output } => {
            write_kubeconfig(&config, &output).map_err(std::io::Error::other)?;
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

fn write_kubeconfig(config: &Config, output: &str) -> Result<(), InitError> {
    let base_url = format!("http://{}", config.listen_addr());
    let kubeconfig = Kubeconfig::for_view(&base_url, &config.base_prefix);
    kubeconfig.write_to(output).map_err(|e| InitError::ConfigLoad(e.to_string()))?;
    log::info!("wrote kubeconfig for view {} to {output}", config.base_prefix);
    Ok(())
}

async fn serve(config: Config) -> std::io::Result<()> {
    let base = Arc::new(BaseView::new(config.watch.queue_size));
    let state = AppState::new(config.base_prefix.clone(), base, config.watch.timeout());

    let algorithm = Arc::new(DefaultScheduler::default());
    let poll_interval = Duration::from_millis(50);
    let launcher = Arc::new(SchedulerLauncher::new(config.simulation.max_concurrent, algorithm, poll_interval));
    let metrics = Arc::new(std::sync::Mutex::new(scaling_advisor::metrics::collector::MetricsCollector::new()));

    let advice_settings = web::Data::new(AdviceSettings {
        launcher,
        strategy: config.scoring.strategy,
        weights: config.scoring.weights(),
        stabilization: StabilizationConfig::default(),
        watch_queue_size: config.watch.queue_size,
        generation_mode: config.advice.generation_mode.into(),
        metrics: metrics.clone(),
    });

    if let Err(e) = write_kubeconfig(&config, &config.kube_config_path) {
        log::warn!("failed to write kubeconfig: {e}");
    }

    let listen_addr = config.listen_addr();
    log::info!("listening on {listen_addr}, base view mounted at /{}", config.base_prefix);

    let app_state = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(advice_settings.clone())
            .configure(scaling_advisor::api::configure)
    })
    .bind(&listen_addr)
    .map_err(|source| InitError::Bind { addr: listen_addr.clone(), source })
    .map_err(std::io::Error::other)?;

    let result = server.run().await;
    scaling_advisor::metrics::printer::print_metrics(metrics, &(&config.metrics).into());
    result
}
