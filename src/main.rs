use clap::Parser;
use gptoss_gateway::{build_router, AppState, GatewayConfig, ModelRegistry, SharedLogger, UpstreamClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "gptoss-gateway",
    about = "OpenAI-compatible chat-completions gateway for the GPT-OSS chatkit streaming API",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and the PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "gptoss-gateway.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gptoss_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::load_or_default(cli.config.as_deref())?;
    config.apply_port_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;
    let registry = ModelRegistry::builtin();

    info!("gptoss-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.upstream.endpoint);
    info!("  Port:      {}", config.port);
    info!("  Models:    {}", registry.descriptors().len());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting gptoss-gateway upstream={} port={}",
            config.upstream.endpoint, config.port
        ),
    );

    let upstream = UpstreamClient::new(config.upstream.clone(), logger.clone())?;

    let state = Arc::new(AppState {
        registry,
        upstream,
        logger,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
