mod config_commands;
mod metrics_commands;
mod run_commands;

use std::{path::PathBuf, time::Duration};

use {
    clap::{Parser, Subcommand},
    cloudmon_config::CloudmonConfig,
    cloudmon_reporter::HttpBackend,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "cloudmon",
    version,
    about = "Publish process metrics to Google Cloud Monitoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cloud project id (overrides config value).
    #[arg(long, global = true, env = "GOOGLE_CLOUD_PROJECT")]
    project: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/cloudmon/).
    #[arg(long, global = true, env = "CLOUDMON_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List metric descriptors in the project.
    List {
        /// Cloud Monitoring filter expression.
        #[arg(long, default_value = metrics_commands::DEFAULT_FILTER)]
        filter: String,
    },
    /// Delete metric descriptors and all of their data.
    Delete {
        /// Metric types (`custom.googleapis.com/...`) or registry names.
        #[arg(required = true)]
        metrics: Vec<String>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Report this process's own metrics until interrupted.
    Run {
        /// Print time series instead of writing them.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load config and apply command-line overrides.
fn load_config(cli: &Cli) -> CloudmonConfig {
    let mut config = cloudmon_config::discover_and_load();
    if let Some(project) = cli.project.as_ref().filter(|p| !p.is_empty()) {
        config.reporter.project = project.clone();
    }
    config
}

fn http_backend(config: &CloudmonConfig) -> anyhow::Result<HttpBackend> {
    Ok(HttpBackend::new(
        &config.backend.endpoint,
        config.backend.access_token.clone(),
        Duration::from_secs(config.backend.request_timeout_secs),
    )?)
}

fn require_project(config: &CloudmonConfig) -> anyhow::Result<&str> {
    let project = config.reporter.project.as_str();
    if project.trim().is_empty() {
        anyhow::bail!("no project configured; pass --project or set GOOGLE_CLOUD_PROJECT");
    }
    Ok(project)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(ref dir) = cli.config_dir {
        cloudmon_config::set_config_dir(dir.clone());
    }
    debug!(version = env!("CARGO_PKG_VERSION"), "cloudmon starting");

    match cli.command {
        Commands::List { ref filter } => {
            let config = load_config(&cli);
            let backend = http_backend(&config)?;
            metrics_commands::list(&backend, require_project(&config)?, filter).await
        },
        Commands::Delete { ref metrics } => {
            let config = load_config(&cli);
            let backend = http_backend(&config)?;
            metrics_commands::delete(
                &backend,
                require_project(&config)?,
                &config.reporter.namespace,
                metrics,
            )
            .await
        },
        Commands::Config { ref action } => {
            config_commands::handle_config(action, cli.project.as_deref())
        },
        Commands::Run { dry_run } => {
            let config = load_config(&cli);
            run_commands::run(&config, dry_run).await
        },
    }
}
