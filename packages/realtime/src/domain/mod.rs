//! ドメイン層
//!
//! レコード、接続状態の状態遷移、バックオフ計算、そして外部コラボレーター
//! （レコードストアと変更フィード）のインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

pub mod backoff;
pub mod chat_window;
pub mod connection;
pub mod error;
pub mod feed;
pub mod record;
pub mod store;

pub use backoff::{MAX_RETRY_DELAY, RetryPolicy};
pub use chat_window::{ChatWindow, InsertOutcome};
pub use connection::{ConnectionState, ConnectionStatus, FailureOutcome};
pub use error::{FeedError, StoreError};
pub use feed::{
    ChangeCallback, ChangeEvent, ChangeFeed, ChangeKind, ChannelHandle, EventFilter,
    StatusCallback, SubscribeStatus,
};
pub use record::{
    CHAT_MESSAGES_TABLE, ChatMessage, DEFAULT_AUTHOR, DEFAULT_STREAM_TITLE,
    STREAM_SETTINGS_TABLE, StreamSettings, StreamStatus,
};
pub use store::{Filter, Query, Record, RecordStore, decode_record};

#[cfg(test)]
pub use store::MockRecordStore;
