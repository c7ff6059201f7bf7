mod app;
mod config;
mod error;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use policy::CallerContext;
use runtime::ToolRegistry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use error::Result;
use server::AppState;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(
    about = "Answers free-text requests with an LLM planner and a toolbox",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to the config file (default: ./gateway.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Address to listen on, overriding server.listen
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Answer a single request and exit
    Ask {
        /// The request text
        text: String,
        /// Caller user id passed to account tools
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List the tool catalog
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen } => cmd_serve(cli.config, listen).await,
        Commands::Ask { text, user } => cmd_ask(cli.config, &text, user).await,
        Commands::Tools => cmd_tools(),
    }
}

async fn cmd_serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    let config = Config::resolve(config_path.as_deref())?;
    let addr = listen.unwrap_or_else(|| config.server.listen.clone());

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        gateway: app::build(&config)?,
        request_timeout: config.request_timeout(),
        shutdown: shutdown.clone(),
    });

    cancel_on_ctrl_c(shutdown);
    let listener = TcpListener::bind(&addr).await?;
    server::serve(state, listener).await?;
    Ok(())
}

async fn cmd_ask(config_path: Option<PathBuf>, text: &str, user: Option<String>) -> Result<()> {
    let config = Config::resolve(config_path.as_deref())?;
    let gateway = app::build(&config)?;

    let ctx = user.map(CallerContext::user).unwrap_or_default();
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let deadline = tokio::time::Instant::now() + config.request_timeout();
    let completion = gateway.run(text, &ctx, deadline, &cancel).await?;

    info!(rounds = completion.rounds, "answered");
    println!("{}", completion.text);
    Ok(())
}

fn cmd_tools() -> Result<()> {
    let registry = ToolRegistry::toolbox()?;
    for spec in registry.list() {
        println!("{}\n  {}", spec.name, spec.description);
        let schema = spec.schema.to_json_schema();
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
        for line in schema.lines() {
            println!("  {line}");
        }
        println!();
    }
    Ok(())
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            token.cancel();
        }
    });
}
