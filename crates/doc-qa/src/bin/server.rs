//! Document Q&A server binary
//!
//! Run with: cargo run -p doc-qa --bin doc-qa-server -- [--config doc-qa.toml] [--port 8080]

use clap::Parser;
use doc_qa::{config::RagConfig, server::RagServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "doc-qa-server", version, about = "Document Q&A HTTP server")]
struct Args {
    /// TOML configuration file (falls back to $DOC_QA_CONFIG, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_qa=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RagConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.llm.backend);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    let server = RagServer::new(config).await?;

    let llm = server.state().engine().llm();
    match llm.health_check().await {
        Ok(true) => tracing::info!("{} is reachable", llm.name()),
        _ => tracing::warn!(
            "{} is not reachable; questions will get the fallback answer until it is",
            llm.name()
        ),
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/upload  - Upload a .pdf or .txt document");
    println!("  POST /api/query   - Ask a question");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
