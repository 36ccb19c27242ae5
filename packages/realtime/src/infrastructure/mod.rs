//! Infrastructure 層
//!
//! ドメイン層が定義する `RecordStore` / `ChangeFeed` の具体的な実装。
//!
//! - `store`: インメモリ実装、HTTP（ゲートウェイ）実装
//! - `feed`: インメモリ実装、WebSocket（ゲートウェイ）実装
//! - `dto`: ゲートウェイとの通信に使う DTO

pub mod dto;
pub mod feed;
pub mod store;
