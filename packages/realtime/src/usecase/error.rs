//! 同期コントローラーの操作エラー

use thiserror::Error;

use crate::domain::{FeedError, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    /// 空白だけのメッセージは送信しない
    #[error("message is empty")]
    EmptyMessage,
}
