mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::{debug, error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    concierge_agents::providers::openai_from_config,
    concierge_auto_reply::Pipeline,
    concierge_channels::ChannelOutbound,
    concierge_config::{ConciergeConfig, Severity},
    concierge_gateway::{GatewayState, start_gateway},
    concierge_whatsapp::{WhatsAppOutbound, WhatsAppOwnerNotifier},
};

#[derive(Parser)]
#[command(name = "concierge", about = "Concierge: WhatsApp auto-reply bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of `concierge.{toml,yaml,json}`).
    #[arg(long, global = true, env = "CONCIERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value and `PORT`).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default when no subcommand is provided).
    Serve,
    /// Validate the configuration and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
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
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, "failed to read .env"),
    }

    match &cli.command {
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(cli.config.as_deref(), *verbose)
        },
        Some(Commands::Serve) | None => serve(&cli).await,
    }
}

/// Load the config file (explicit path or discovered), then apply env and
/// CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<ConciergeConfig> {
    let path = cli.config.clone().or_else(concierge_config::find_config_file);
    let mut config = match &path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            concierge_config::load_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        },
        None => {
            info!("no config file found, using defaults");
            ConciergeConfig::default()
        },
    };

    concierge_config::apply_env_overrides(&mut config);
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    let report = concierge_config::validate(&config);
    for diagnostic in &report.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Info => debug!("{diagnostic}"),
        }
    }
    if report.has_errors() {
        anyhow::bail!(
            "configuration has {} error(s); run `concierge check-config` for details",
            report.count(Severity::Error)
        );
    }

    #[cfg(feature = "metrics")]
    let metrics_handle = concierge_metrics::init_metrics(concierge_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: vec![("service".into(), "concierge".into())],
    })?;

    let reply_provider = openai_from_config(&config.provider, &config.provider.model);
    let classifier_provider =
        openai_from_config(&config.provider, config.provider.classifier_model());

    let outbound: Arc<dyn ChannelOutbound> =
        Arc::new(WhatsAppOutbound::from_config(&config.whatsapp));
    let notifier = Arc::new(WhatsAppOwnerNotifier::new(
        Arc::clone(&outbound),
        config.whatsapp.owner_number.clone(),
        config.business.name.clone(),
    ));

    let pipeline = Arc::new(Pipeline::from_config(
        &config,
        reply_provider,
        classifier_provider,
        outbound,
        notifier,
    ));

    let state = GatewayState::new(pipeline, &config.whatsapp);
    #[cfg(feature = "metrics")]
    let state = state.with_metrics(metrics_handle);

    info!(
        business = %config.business.name,
        model = %config.provider.model,
        scope = config.scope.enabled,
        escalation = config.escalation.enabled,
        "concierge starting"
    );
    start_gateway(&config.server.bind, config.server.port, Arc::new(state)).await
}
