//! # Helpdesk
//!
//! Conversational support router with a retrieval-backed answering handler.
//!
//! Usage:
//!   helpdesk serve                        # Start the HTTP gateway
//!   helpdesk ingest --csv faq.csv         # Build the knowledge index
//!   helpdesk ask "Como pedir reembolso?"  # One-shot answer
//!   helpdesk route "quero um atendente"   # Show the routing decision only

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use helpdesk_agent::{Coordinator, Router};
use helpdesk_core::HelpdeskConfig;
use helpdesk_core::config::LogFormat;
use helpdesk_core::types::Context;
use helpdesk_knowledge::{KnowledgeRetriever, SetupOutcome, corpus_stats, load_csv};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "helpdesk",
    version,
    about = "🎧 Helpdesk: support message router and FAQ answering"
)]
struct Cli {
    /// Config file (default: $HELPDESK_CONFIG or ~/.helpdesk/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load the CSV corpus and build the knowledge index
    Ingest {
        /// Corpus CSV (default: knowledge.corpus_path)
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Discard the persisted collection and re-embed everything
        #[arg(long)]
        force_rebuild: bool,
    },
    /// Answer one message through the full pipeline
    Ask {
        message: String,
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the routing decision for a message
    Route { message: String },
    /// Similarity search over the knowledge index
    Search {
        query: String,
        #[arg(short, default_value = "5")]
        k: usize,
    },
    /// Write the default config file
    Init,
}

fn load_config(path: Option<&PathBuf>) -> Result<HelpdeskConfig> {
    let cfg = match path {
        Some(p) => HelpdeskConfig::load_from(p)?,
        None => HelpdeskConfig::load()?,
    };
    Ok(cfg)
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(HelpdeskConfig::default_path);
    if path.exists() {
        println!("⚠️  Config already exists: {}", path.display());
    } else {
        HelpdeskConfig::default().save_to(&path)?;
        println!("✅ Wrote default config to {}", path.display());
    }
    Ok(())
}

fn init_logging(cfg: &HelpdeskConfig, verbose: bool) {
    let default_filter = if verbose {
        "helpdesk=debug,helpdesk_agent=debug,helpdesk_knowledge=debug,helpdesk_providers=debug,helpdesk_gateway=debug,tower_http=debug".to_string()
    } else {
        cfg.logging.level.clone()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match cfg.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

fn build_retriever(cfg: &HelpdeskConfig) -> Result<Arc<KnowledgeRetriever>> {
    let embedder = helpdesk_providers::create_embedder(&cfg.embedding)?;
    Ok(Arc::new(KnowledgeRetriever::new(
        &cfg.knowledge,
        embedder,
        Duration::from_secs(cfg.embedding.timeout_secs.max(1)),
    )))
}

/// Load the persisted index, building it from the configured corpus when
/// nothing has been persisted yet.
async fn prepare_retriever(cfg: &HelpdeskConfig) -> Result<Arc<KnowledgeRetriever>> {
    let retriever = build_retriever(cfg)?;
    if retriever.setup(None, false).await? == SetupOutcome::Missing {
        match cfg.knowledge.corpus_file() {
            Some(path) if path.exists() => {
                let docs = load_csv(&path)?;
                retriever.setup(Some(&docs), false).await?;
            }
            _ => tracing::warn!(
                "⚠️ Knowledge index is empty; run `helpdesk ingest --csv <file>` to build it"
            ),
        }
    }
    Ok(retriever)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Init = cli.command {
        return init_config(cli.config);
    }

    let cfg = load_config(cli.config.as_ref())?;
    init_logging(&cfg, cli.verbose);

    match cli.command {
        Command::Serve { host, port } => {
            let mut gateway = cfg.gateway.clone();
            if let Some(h) = host {
                gateway.host = h;
            }
            if let Some(p) = port {
                gateway.port = p;
            }
            let generator = helpdesk_providers::create_generator(&cfg.llm)?;
            let retriever = prepare_retriever(&cfg).await?;
            let coordinator = Arc::new(Coordinator::new(&cfg, generator, retriever));

            println!("🎧 Helpdesk v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 API:       http://{}:{}{}", gateway.host, gateway.port, gateway.api_prefix);
            println!("   🤖 Model:     {} ({})", cfg.llm.model, cfg.llm.provider);
            println!("   📚 Index:     {}", cfg.knowledge.persist_dir().display());
            println!("   🧭 Dispatch:  {:?}", cfg.routing.dispatch);
            println!();

            helpdesk_gateway::start(&gateway, coordinator, cfg.knowledge.top_k).await?;
        }
        Command::Ingest { csv, force_rebuild } => {
            let path = csv
                .or_else(|| cfg.knowledge.corpus_file())
                .context("no corpus given: pass --csv or set knowledge.corpus_path")?;
            let docs = load_csv(&path)
                .with_context(|| format!("loading corpus {}", path.display()))?;

            let retriever = build_retriever(&cfg)?;
            let stats = corpus_stats(&docs, retriever.chunker());
            println!("📄 Corpus: {}", path.display());
            println!("{}", serde_json::to_string_pretty(&stats)?);

            let outcome = retriever.setup(Some(&docs), force_rebuild).await?;
            println!("🔨 {}", serde_json::to_string(&outcome)?);
            println!("{}", serde_json::to_string_pretty(&retriever.stats().await)?);
        }
        Command::Ask { message, session } => {
            let generator = helpdesk_providers::create_generator(&cfg.llm)?;
            let retriever = prepare_retriever(&cfg).await?;
            let coordinator = Coordinator::new(&cfg, generator, retriever);
            let ctx = session.map(Context::for_session);
            let resp = coordinator.handle(&message, ctx).await;

            println!("{}\n", resp.response_text);
            println!(
                "handler: {} | session: {} | escalated: {}",
                resp.handler_used, resp.session_id, resp.escalated
            );
            if let Some(sources) = resp.sources.filter(|s| !s.is_empty()) {
                println!("sources:");
                for url in sources {
                    println!("  - {url}");
                }
            }
        }
        Command::Route { message } => {
            let decision = Router::from_config(&cfg.routing).route(&message);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::Search { query, k } => {
            let retriever = prepare_retriever(&cfg).await?;
            let hits = retriever.search(&query, k).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Init => {}
    }

    Ok(())
}
