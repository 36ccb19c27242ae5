//! 変更フィード（publish/subscribe）のインターフェース
//!
//! チャンネルはトピック名で開き、テーブル・イベント種別ごとにリスナーを登録し、
//! `subscribe` でハンドシェイクを開始します。ハンドシェイクの結果は await ではなく
//! コールバックで届きます（いつまでも届かないこともある）。

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::error::FeedError;

/// 行レベルの変更種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("INSERT"),
            Self::Update => f.write_str("UPDATE"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// リスナーが受け取るイベント種別（`*` は全種別）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFilter {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl EventFilter {
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Insert => kind == ChangeKind::Insert,
            Self::Update => kind == ChangeKind::Update,
            Self::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// 行レベルの変更イベント
///
/// `new` は INSERT / UPDATE 後の行、`old` は UPDATE / DELETE 前の行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: &str, row: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(table: &str, old: Value, new: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(table: &str, old: Value) -> Self {
        Self {
            table: table.to_string(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// `new` をドメインモデルに変換
    pub fn decode_new<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.new.clone().unwrap_or(Value::Null))
    }

    /// `old` の `id` 列を文字列として取り出す（数値 ID も文字列化する）
    pub fn old_id(&self) -> Option<String> {
        match self.old.as_ref()?.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// ハンドシェイクの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscribeStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl SubscribeStatus {
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Subscribed)
    }
}

impl fmt::Display for SubscribeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed => f.write_str("SUBSCRIBED"),
            Self::ChannelError => f.write_str("CHANNEL_ERROR"),
            Self::TimedOut => f.write_str("TIMED_OUT"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// 変更イベントを受け取るコールバック
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// ハンドシェイクの状態を受け取るコールバック
pub type StatusCallback = Arc<dyn Fn(SubscribeStatus) + Send + Sync>;

/// 変更フィードのチャンネル
///
/// 1 つの接続マネージャーが排他的に所有する。コールバックは任意のタスクから
/// 呼ばれる可能性があるため、呼び出し側でロックを保持したまま操作しないこと。
pub trait ChannelHandle: Send + Sync {
    /// チャンネルのトピック名
    fn topic(&self) -> &str;

    /// テーブル・イベント種別ごとのリスナーを登録
    fn on_change(&self, table: &str, event: EventFilter, callback: ChangeCallback);

    /// テーブル・イベント種別が一致するリスナーを解除
    fn off(&self, table: &str, event: EventFilter);

    /// ハンドシェイクを開始し、結果を `callback` で通知
    fn subscribe(&self, callback: StatusCallback);

    /// 購読を解除（以後イベントは配送されない）
    fn unsubscribe(&self);
}

/// 変更フィード
pub trait ChangeFeed: Send + Sync {
    /// トピックのチャンネルを作成（ハンドシェイクはまだ行わない）
    fn open_channel(&self, topic: &str) -> Result<Arc<dyn ChannelHandle>, FeedError>;

    /// チャンネルを解放
    fn release_channel(&self, handle: &Arc<dyn ChannelHandle>);
}
