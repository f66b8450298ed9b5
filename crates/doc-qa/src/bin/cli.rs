//! Command-line front end running the upload and query pipeline in-process
//!
//! Build with: cargo build -p doc-qa --bin doc-qa

use clap::{Parser, Subcommand};
use doc_qa::{config::RagConfig, server::state::AppState};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "doc-qa", version, about = "Ask questions about your documents")]
struct Cli {
    /// TOML configuration file (falls back to $DOC_QA_CONFIG, then defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload and index .pdf or .txt files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Interactive multi-turn conversation
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_qa=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref())?;
    let state = AppState::new(config).await?;

    match cli.command {
        Command::Upload { files } => {
            for path in files {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let data = tokio::fs::read(&path).await?;
                match state.pipeline().upload(&filename, data).await {
                    Ok(response) => println!(
                        "{}: {} chunks processed",
                        response.source_id, response.chunks_processed
                    ),
                    Err(e) => eprintln!("{}: {}", path.display(), e),
                }
            }
        }
        Command::Ask { question } => {
            let answer = state.engine().answer(&question.join(" ")).await?;
            println!("{}", answer);
        }
        Command::Chat => chat(&state).await?,
    }

    Ok(())
}

async fn chat(state: &AppState) -> anyhow::Result<()> {
    println!("Ask about your documents. Empty line or Ctrl+D to quit, /clear to reset.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let question = line.trim();

        match question {
            "" => break,
            "/clear" => {
                state.engine().conversation().clear().await;
                println!("(conversation cleared)");
            }
            _ => match state.engine().answer(question).await {
                Ok(answer) => println!("{}\n", answer),
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }

    Ok(())
}
