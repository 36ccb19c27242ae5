//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use carrera_realtime::infrastructure::feed::InMemoryChangeFeed;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::StoreGatewayUseCase;

use super::{
    error::ServerError,
    handler::{health_check, realtime_handler, store_operation},
    signal::shutdown_signal,
    state::AppState,
};

/// Realtime gateway server
///
/// # Example
///
/// ```ignore
/// let feed = InMemoryChangeFeed::new();
/// let store = Arc::new(InMemoryRecordStore::with_feed(feed.clone()));
/// let server = Server::new(Arc::new(StoreGatewayUseCase::new(store)), feed);
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// StoreGatewayUseCase（REST 経由のストア操作のユースケース）
    store_gateway: Arc<StoreGatewayUseCase>,
    /// ストアの変更を流す変更フィード
    feed: InMemoryChangeFeed,
}

impl Server {
    pub fn new(store_gateway: Arc<StoreGatewayUseCase>, feed: InMemoryChangeFeed) -> Self {
        Self {
            store_gateway,
            feed,
        }
    }

    /// ルーティングを組み立てる
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            store_gateway: self.store_gateway.clone(),
            feed: self.feed.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/realtime", get(realtime_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/rest/{table}/{operation}", post(store_operation))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the gateway on `host:port` until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), ServerError> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        tracing::info!("Realtime gateway listening on {}", listener.local_addr()?);
        tracing::info!("Store endpoint: http://{}/rest/{{table}}/{{operation}}", bind_addr);
        tracing::info!("Change feed endpoint: ws://{}/realtime", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Serve on an already bound listener (no shutdown signal)
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
