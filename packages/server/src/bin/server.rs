//! Realtime gateway for carrera-live.
//!
//! Hosts the in-memory record store and change feed for remote consoles.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin carrera-server
//! cargo run --bin carrera-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use carrera_realtime::infrastructure::{feed::InMemoryChangeFeed, store::InMemoryRecordStore};
use carrera_server::{
    ui::{Server, ServerError},
    usecase::{SeedStreamSettingsUseCase, StoreGatewayUseCase},
};
use carrera_shared::{logger::setup_logger, time::SystemClock};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carrera-server")]
#[command(about = "Realtime gateway hosting the live stream settings and chat tables", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Title of the seeded stream settings row
    #[arg(long)]
    title: Option<String>,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "debug")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    // 1. Backend（変更フィードとそれに接続したストア）
    let feed = InMemoryChangeFeed::new();
    let store = Arc::new(InMemoryRecordStore::with_feed(feed.clone()));

    // 2. 配信設定の初期行
    SeedStreamSettingsUseCase::new(store.clone(), Arc::new(SystemClock))
        .execute(args.title)
        .await?;

    // 3. Server
    let server = Server::new(Arc::new(StoreGatewayUseCase::new(store)), feed);
    server.run(args.host, args.port).await
}
