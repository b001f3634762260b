//! tasksmith - CLI entry point.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tasksmith::server::{self, AppState, SharedClient};
use tasksmith::{AppConfig, TaskRunner};

/// Text generation, code generation and classification with Gemini.
#[derive(Parser, Debug)]
#[command(name = "tasksmith")]
#[command(about = "Text generation, code generation and classification with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, env = "TASKSMITH_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, env = "TASKSMITH_PORT", default_value_t = 8081)]
        port: u16,
    },

    /// Generate free-form text
    Text {
        prompt: String,
    },

    /// Generate code
    Code {
        prompt: String,
    },

    /// Classify text into one of the given categories
    Classify {
        text: String,

        /// Candidate category (repeat for each category)
        #[arg(short, long = "category", required = true)]
        categories: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let runner = build_runner(&config);

    match cli.command {
        Command::Serve { host, port } => {
            let addr = SocketAddr::new(host, port);
            server::serve(addr, AppState::new(runner))
                .await
                .with_context(|| format!("Failed to serve on {}", addr))?;
        }
        Command::Text { prompt } => {
            let text = runner
                .generate_text(&prompt)
                .await
                .context("Text generation failed")?;
            println!("{}", text);
        }
        Command::Code { prompt } => {
            let code = runner
                .generate_code(&prompt)
                .await
                .context("Code generation failed")?;
            println!("{}", code);
        }
        Command::Classify { text, categories } => {
            let result = runner
                .classify_text_detailed(&text, &categories)
                .await
                .context("Classification failed")?;
            if !result.matched {
                eprintln!(
                    "Warning: no category matched the model's answer, falling back to '{}'",
                    result.label
                );
            }
            println!("{}", result.label);
        }
    }

    Ok(())
}

/// Build a task runner from configuration.
fn build_runner(config: &AppConfig) -> TaskRunner<SharedClient> {
    let client: SharedClient = Arc::new(config.gemini_client());
    let runner = TaskRunner::new(client);
    match config.retry_budget {
        Some(budget) => runner.with_retry_budget(budget),
        None => runner,
    }
}
