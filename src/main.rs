use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nadlan::config::Config;
use nadlan::domain::DomainError;
use nadlan::infrastructure::{server, AppState};
use nadlan::services::pipeline;
use nadlan::services::query_service::QueryConfig;

/// Command-line overrides on top of the environment configuration
#[derive(Debug, Default)]
struct CliArgs {
    mcp: bool,
    rebuild: bool,
    source: Option<PathBuf>,
    port: Option<u16>,
}

impl CliArgs {
    fn parse(args: &[String]) -> Self {
        let value_of = |flag: &str| {
            args.iter()
                .position(|arg| arg == flag)
                .and_then(|pos| args.get(pos + 1))
        };

        let port = value_of("--port").and_then(|v| match v.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!("Ignoring invalid --port value '{}'", v);
                None
            }
        });

        Self {
            mcp: args.iter().any(|arg| arg == "--mcp"),
            rebuild: args.iter().any(|arg| arg == "--rebuild"),
            source: value_of("--source").map(PathBuf::from),
            port,
        }
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout belongs to the MCP transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nadlan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DomainError> {
    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args);

    let mut config = Config::from_env();
    if let Some(source) = cli.source {
        config.source_path = source;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!("Loading listings from {}", config.source_path.display());

    // Nothing is served until the catalog is complete
    let catalog = tokio::select! {
        result = pipeline::load_catalog(&config, cli.rebuild) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted during catalog build, nothing published");
            return Ok(());
        }
    };

    let state = AppState::new(
        Arc::new(catalog),
        QueryConfig {
            default_limit: config.default_limit,
        },
    );

    // [MCP] Serve over stdio if --mcp flag is present
    #[cfg(feature = "mcp")]
    {
        if cli.mcp {
            tracing::info!("Starting in MCP Mode (Stdio)...");
            nadlan::api::mcp::start_server(state.query).await;
            return Ok(());
        }
    }
    #[cfg(not(feature = "mcp"))]
    {
        if cli.mcp {
            tracing::warn!("Built without the mcp feature, serving HTTP instead");
        }
    }

    server::start_server(state, config.port).await?;
    Ok(())
}
