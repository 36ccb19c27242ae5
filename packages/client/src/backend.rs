//! Backend selection: the realtime gateway or a local in-memory backend.

use std::sync::Arc;

use carrera_realtime::{
    domain::{
        ChangeFeed, Query, RecordStore, STREAM_SETTINGS_TABLE, StoreError, StreamSettings,
        SubscribeStatus,
    },
    infrastructure::{
        feed::{HandshakeMode, InMemoryChangeFeed, WsChangeFeed},
        store::{HttpRecordStore, InMemoryRecordStore},
    },
};
use carrera_shared::time::Clock;

/// コントローラーに渡すストアと変更フィード
pub struct Backend {
    pub store: Arc<dyn RecordStore>,
    pub feed: Arc<dyn ChangeFeed>,
    /// ローカルの場合だけ障害を発生させられる
    local: Option<InMemoryChangeFeed>,
    description: String,
}

impl Backend {
    /// ゲートウェイに接続する（`server_url` は `http://127.0.0.1:8080` の形式）
    pub fn remote(server_url: &str) -> Self {
        let realtime = realtime_url(server_url);
        let description = format!("gateway {} ({})", server_url, realtime);
        Self {
            store: Arc::new(HttpRecordStore::new(server_url)),
            feed: Arc::new(WsChangeFeed::new(&realtime)),
            local: None,
            description,
        }
    }

    /// プロセス内のインメモリバックエンド（配信設定の行を 1 行入れておく）
    pub async fn local(clock: &dyn Clock) -> Result<Self, StoreError> {
        let feed = InMemoryChangeFeed::new();
        let store = InMemoryRecordStore::with_feed(feed.clone());

        let existing = store
            .fetch_many(STREAM_SETTINGS_TABLE, Query::ordered_by("id", true).limit(1))
            .await?;
        if existing.is_empty() {
            let settings = StreamSettings::fallback(clock.now());
            let record = serde_json::to_value(&settings)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
            store.insert(STREAM_SETTINGS_TABLE, record).await?;
        }

        Ok(Self {
            store: Arc::new(store),
            feed: Arc::new(feed.clone()),
            local: Some(feed),
            description: "local in-memory backend".to_string(),
        })
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// 指定したトピックのチャンネルに `CHANNEL_ERROR` を通知する
    ///
    /// 通知できたチャンネル数を返す。ローカルでなければ `None`。
    pub fn drop_channels(&self, topics: &[&str]) -> Option<usize> {
        let feed = self.local.as_ref()?;
        let dropped = topics
            .iter()
            .filter(|topic| feed.emit_status(topic, SubscribeStatus::ChannelError))
            .count();
        tracing::info!("Simulated channel drop on {} channel(s)", dropped);
        Some(dropped)
    }

    /// ハンドシェイクを拒否させる（障害の再現）
    pub fn set_outage(&self, outage: bool) -> bool {
        let Some(feed) = &self.local else {
            return false;
        };
        let mode = if outage {
            HandshakeMode::Reject(SubscribeStatus::ChannelError)
        } else {
            HandshakeMode::Accept
        };
        feed.set_handshake_mode(mode);
        true
    }
}

/// `http(s)://host:port` から `ws(s)://host:port/realtime` を作る
pub fn realtime_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/realtime", base)
}
