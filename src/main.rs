use anyhow::Context;
use clap::{Parser, Subcommand};
use intentgate::classifier::{load_intents, IntentClassifier};
use intentgate::config::Config;
use intentgate::retrieval::{create_embedder, SemanticRetriever};
use intentgate::telemetry::{ExchangeLog, ExchangeSink, ExchangeStats};
use intentgate::Assistant;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Local intent classifier first, retrieval-augmented LLM fallback.
#[derive(Parser, Debug)]
#[command(name = "intentgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about, long_about = None)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,
        /// Override gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Train the intent classifier from data/intents.json and save it
    Train,

    /// Embed the knowledge base and save the vector index
    Index,

    /// Answer one message and print the routing outcome as JSON
    Chat { message: String },

    /// Print exchange-log statistics
    Stats,

    /// Print the config JSON schema
    ConfigSchema,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intentgate=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::ConfigSchema = cli.command {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let assistant = tokio::task::spawn_blocking(move || Assistant::bootstrap(config))
                .await
                .context("Startup task panicked")??;
            intentgate::gateway::run_gateway(Arc::new(assistant)).await
        }

        Commands::Train => {
            let intents = load_intents(&config.paths.intents_path())?;
            let mut classifier = IntentClassifier::new(config.classifier.clone());
            let summary = classifier.train(&intents)?;
            let artifact = config.paths.classifier_artifact();
            classifier.save(&artifact)?;
            println!(
                "Trained {} intents from {} samples -> {}",
                summary.intents,
                summary.samples,
                artifact.display()
            );
            Ok(())
        }

        Commands::Index => {
            let embedder = create_embedder(&config.retrieval)?;
            let mut retriever = SemanticRetriever::new(embedder);
            let summary = retriever.build_index(
                &config.paths.knowledge_base_dir(),
                &config.retrieval.extension,
            )?;
            let artifact = config.paths.index_artifact();
            retriever.save(&artifact)?;
            println!("Indexed {} documents -> {}", summary.documents, artifact.display());
            Ok(())
        }

        Commands::Chat { message } => {
            let assistant = tokio::task::spawn_blocking(move || Assistant::bootstrap(config))
                .await
                .context("Startup task panicked")??;
            let outcome = assistant.chat(&message).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        Commands::Stats => {
            let stats = if config.store.enabled {
                ExchangeLog::open(&config.store.db_path, config.store.max_exchanges)?.stats()?
            } else {
                ExchangeStats::default()
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::ConfigSchema => Ok(()),
    }
}
