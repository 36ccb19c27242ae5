//! ドメイン層のエラー型

use thiserror::Error;

/// レコードストアのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// 条件に一致する行が存在しない
    #[error("no rows found in '{0}'")]
    NotFound(String),

    /// 1 行を期待したが複数行が一致した
    #[error("multiple rows in '{0}' matched where one was expected")]
    MultipleRows(String),

    /// レコードの形式が不正
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// レコードをドメインモデルに変換できない
    #[error("failed to decode record: {0}")]
    Decode(String),

    /// 通信エラー
    #[error("store request failed: {0}")]
    Transport(String),
}

/// 変更フィードのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// 同じトピックのチャンネルがすでに開かれている
    #[error("channel '{0}' is already open")]
    TopicInUse(String),

    /// 通信エラー
    #[error("feed transport error: {0}")]
    Transport(String),
}
