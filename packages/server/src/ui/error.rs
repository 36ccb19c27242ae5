//! Gateway server errors.

use carrera_realtime::domain::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// 待ち受けアドレスを確保できない
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    /// 起動時の初期データ投入に失敗した
    #[error("failed to seed the record store: {0}")]
    Seed(#[from] StoreError),
}
