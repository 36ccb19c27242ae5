//! レコードストアの実装
//!
//! - `inmemory`: プロセス内のテーブル（テスト・ローカル実行・ゲートウェイ内部）
//! - `http`: ゲートウェイの REST エンドポイントを呼び出す実装

pub mod http;
pub mod inmemory;

pub use http::HttpRecordStore;
pub use inmemory::InMemoryRecordStore;
