//! Admin console for carrera-live.
//!
//! Mounts the live stream settings and chat sync controllers and renders their
//! state. Plain lines are sent as chat messages; `/help` lists the commands.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin carrera-console -- --local
//! cargo run --bin carrera-console -- --server-url http://127.0.0.1:8080 --author Marta
//! ```

use std::sync::Arc;

use carrera_client::{
    backend::Backend,
    error::ClientError,
    session::{ConsoleOptions, ConsoleSession},
};
use carrera_realtime::config::RealtimeConfig;
use carrera_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carrera-console")]
#[command(about = "Admin console for the live stream settings and live chat", long_about = None)]
struct Args {
    /// Realtime gateway URL
    #[arg(short = 'u', long, default_value = "http://127.0.0.1:8080")]
    server_url: String,

    /// Use an in-process in-memory backend instead of the gateway
    #[arg(long)]
    local: bool,

    /// Author name for sent messages
    #[arg(short = 'a', long)]
    author: Option<String>,

    /// Use the admin chat channel and message limit
    #[arg(long)]
    admin: bool,

    /// Maximum number of chat messages kept on screen
    #[arg(short = 'n', long)]
    message_limit: Option<usize>,

    /// Realtime settings as JSON (missing fields take their defaults)
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!("Console error: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RealtimeConfig::default(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = if args.local {
        Backend::local(clock.as_ref()).await?
    } else {
        Backend::remote(&args.server_url)
    };

    let options = ConsoleOptions {
        config,
        author: args.author,
        admin: args.admin,
        message_limit: args.message_limit,
    };
    ConsoleSession::new(backend, options, clock).run().await
}

fn load_config(path: &str) -> Result<RealtimeConfig, ClientError> {
    let text = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigRead {
        path: path.to_string(),
        source,
    })?;
    Ok(RealtimeConfig::from_json(&text)?)
}
