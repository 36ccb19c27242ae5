//! 変更フィードの実装
//!
//! - `inmemory`: プロセス内で完結する実装（テスト・ローカル実行・ゲートウェイ内部）
//! - `websocket`: ゲートウェイの `/realtime` エンドポイントに接続する実装

mod listener;
pub mod inmemory;
pub mod websocket;

pub use inmemory::{HandshakeMode, InMemoryChangeFeed};
pub use websocket::WsChangeFeed;
