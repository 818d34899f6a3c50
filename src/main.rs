//! A2A orchestrator - main entry point

use a2a_orchestrator::classifier::IntentClassifier;
use a2a_orchestrator::config::OrchestratorConfig;
use a2a_orchestrator::llm::provider::LlmProvider;
use a2a_orchestrator::llm::providers::{OpenAiConfig, OpenAiProvider};
use a2a_orchestrator::observability::init_default_logging;
use a2a_orchestrator::orchestrator::Orchestrator;
use a2a_orchestrator::registry::HandlerRegistry;
use a2a_orchestrator::server;
use a2a_orchestrator::transport::HttpTransport;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Routes A2A tasks to specialist handlers and merges their answers
#[derive(Parser)]
#[command(name = "a2a-orchestrator")]
#[command(about = "Agent-to-agent orchestrator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON-RPC endpoint
    Serve,
    /// Classify a query and print the routing decision without calling handlers
    Classify {
        text: String,
        /// Skip the semantic tier even when an API key is available
        #[arg(long)]
        heuristic: bool,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting a2a-orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::Classify { text, heuristic } => classify(config, &text, heuristic).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(OrchestratorConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["orchestrator.toml", "config/orchestrator.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(OrchestratorConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create orchestrator.toml".into())
        }
    }
}

fn create_provider(
    config: &OrchestratorConfig,
) -> Result<Arc<dyn LlmProvider>, Box<dyn std::error::Error>> {
    match config.llm.provider.as_str() {
        "openai" => {
            let mut openai_config = OpenAiConfig {
                api_key: config.get_llm_api_key()?,
                ..Default::default()
            };
            if let Some(base_url) = &config.llm.base_url {
                openai_config.base_url = base_url.clone();
            }
            Ok(Arc::new(OpenAiProvider::new(openai_config)?))
        }
        provider => Err(format!("Unsupported LLM provider: {provider}").into()),
    }
}

fn build_orchestrator(
    config: OrchestratorConfig,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let provider = create_provider(&config)?;
    let transport = Arc::new(HttpTransport::new(config.get_auth_token())?);

    Ok(Orchestrator::new(config, provider, transport).with_llm_semantic())
}

async fn run_server(config: OrchestratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Orchestrator {} starting with {} handlers",
        config.orchestrator.id,
        config.handlers.len()
    );

    let addr = server::listen_addr(&config.server.host, config.server.port)?;
    let orchestrator = Arc::new(build_orchestrator(config)?);

    server::serve(orchestrator, addr, shutdown_signal()).await?;
    Ok(())
}

async fn classify(
    config: OrchestratorConfig,
    text: &str,
    heuristic: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = if heuristic {
        heuristic_classifier(&config).classify_heuristic(text)
    } else {
        match build_orchestrator(config.clone()) {
            Ok(orchestrator) => orchestrator.classify(text).await,
            Err(e) => {
                warn!("Semantic classification unavailable ({}), using patterns only", e);
                heuristic_classifier(&config).classify_heuristic(text)
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn heuristic_classifier(config: &OrchestratorConfig) -> IntentClassifier {
    IntentClassifier::new(
        Arc::new(HandlerRegistry::from_config(config)),
        config.classifier.clone(),
    )
}

fn handle_config_command(
    config: OrchestratorConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
