//! UseCase 層
//!
//! 接続マネージャーと、それを利用する同期コントローラー群。
//!
//! - `connection_manager`: 1 トピック分のチャンネルの接続・再接続を管理
//! - `settings_sync`: 配信設定の同期
//! - `chat_sync`: チャットメッセージの同期
//! - `diagnostics`: 接続トラブルの切り分け

pub mod chat_sync;
pub mod connection_manager;
pub mod diagnostics;
pub mod error;
pub mod settings_sync;

pub use chat_sync::{ChatSync, ChatSyncOptions, ChatView, ScrollEvent, ScrollRequest, ScrollTracker};
pub use connection_manager::{ConnectionManager, Reconnect, ResourceSnapshot};
pub use diagnostics::{DiagnosticResult, DiagnosticStatus, LiveDiagnostics};
pub use error::SyncError;
pub use settings_sync::{SettingsSync, SettingsSyncOptions, SettingsView};
