//! Error types for the console.

use carrera_realtime::{domain::StoreError, usecase::SyncError};
use thiserror::Error;

/// Console-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// 設定ファイルを読めない
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("Unknown command: {0} (type /help)")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    /// ローカルバックエンドでしか使えない操作
    #[error("{0} is only available with --local")]
    LocalOnly(&'static str),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
