//! 同期対象のレコード

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 配信設定のテーブル（1 行だけを持つ）
pub const STREAM_SETTINGS_TABLE: &str = "live_stream";

/// チャットメッセージのテーブル
pub const CHAT_MESSAGES_TABLE: &str = "live_chat_messages";

/// 設定を取得できなかったときのタイトル
pub const DEFAULT_STREAM_TITLE: &str = "Próxima Carrera";

/// 投稿者が指定されなかったときの名前
pub const DEFAULT_AUTHOR: &str = "Admin";

/// 配信設定
///
/// 管理者がストア経由で更新し、同期コントローラーは観測するだけ。
/// 変更イベントを受け取るたびに丸ごと置き換える（部分的なマージはしない）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub id: i64,
    pub is_live: bool,
    pub stream_title: Option<String>,
    /// ストア上の列名は `iframe_url`
    #[serde(rename = "iframe_url", alias = "playback_url")]
    pub playback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamSettings {
    /// 取得に失敗したときの代替設定
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            id: 1,
            is_live: false,
            stream_title: Some(DEFAULT_STREAM_TITLE.to_string()),
            playback_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 再生 URL があるか（空文字列はないものとみなす）
    pub fn has_playback_url(&self) -> bool {
        !self.playback_url.as_deref().is_none_or(str::is_empty)
    }
}

/// 配信ステータス（設定から都度計算し、保存しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Loading,
    Offline,
    Preparing,
    Live,
}

impl StreamStatus {
    /// 設定から配信ステータスを計算
    ///
    /// - 設定がまだない: `Loading`
    /// - 配信中でない: `Offline`
    /// - 配信中だが再生 URL がない: `Preparing`
    /// - それ以外: `Live`
    pub fn derive(settings: Option<&StreamSettings>) -> Self {
        match settings {
            None => Self::Loading,
            Some(s) if !s.is_live => Self::Offline,
            Some(s) if !s.has_playback_url() => Self::Preparing,
            Some(_) => Self::Live,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Offline => "offline",
            Self::Preparing => "preparing",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// チャットメッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
