//! relay - a tool-calling agent over MCP capability providers

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ask_command, init_command, servers_command, tools_command, DEFAULT_PROMPT};

/// relay - answer a prompt with tools from MCP servers
#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "A tool-calling agent over MCP capability providers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (default: ./config.json, then ~/.relay/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one prompt to a final answer
    Ask {
        /// Prompt to send
        #[arg(default_value = DEFAULT_PROMPT)]
        prompt: String,
    },
    /// Start the enabled providers and list their tools
    Tools,
    /// List known providers and which are enabled
    Servers,
    /// Write a default config file
    Init,
}

/// RUST_LOG wins, then --verbose, then the configured level
fn init_tracing(verbose: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // credentials such as GROQ_API_KEY may live in ./.env
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = commands::configured_log_level(cli.config.as_deref()).await;
    init_tracing(cli.verbose, &level);

    match dotenv {
        Ok(path) => debug!("environment loaded from {}", path.display()),
        Err(e) => debug!("no .env loaded: {}", e),
    }

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Ask { prompt } => ask_command(config, &prompt).await,
        Commands::Tools => tools_command(config).await,
        Commands::Servers => servers_command(config).await,
        Commands::Init => init_command(config).await,
    };

    // printed directly so it shows even with logging off
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
