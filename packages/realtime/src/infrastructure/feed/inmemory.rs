//! インメモリの変更フィード
//!
//! プロセス内で publish/subscribe を完結させる。ハンドシェイクの結果を
//! `HandshakeMode` で差し替えられるので、接続失敗・タイムアウトの再現にも使う。

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::listener::{ChannelCore, Phase};
use crate::domain::{
    ChangeCallback, ChangeEvent, ChangeFeed, ChannelHandle, EventFilter, FeedError,
    StatusCallback, SubscribeStatus,
};

/// `subscribe_all` が保持するイベント数
const TAP_CAPACITY: usize = 256;

/// `subscribe` 呼び出し時のハンドシェイクの振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeMode {
    /// 即座に `SUBSCRIBED` を返す
    #[default]
    Accept,
    /// 指定の失敗ステータスを返す
    Reject(SubscribeStatus),
    /// 何も返さない（タイムアウトの再現用）
    Silent,
}

struct FeedState {
    mode: HandshakeMode,
    channels: HashMap<String, Arc<InMemoryChannel>>,
    opened: usize,
}

struct FeedInner {
    state: Mutex<FeedState>,
    tap: broadcast::Sender<ChangeEvent>,
}

/// インメモリの変更フィード
///
/// クローンは同じフィードを共有する。
#[derive(Clone)]
pub struct InMemoryChangeFeed {
    inner: Arc<FeedInner>,
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState {
                    mode: HandshakeMode::Accept,
                    channels: HashMap::new(),
                    opened: 0,
                }),
                tap,
            }),
        }
    }

    /// 以降の `subscribe` のハンドシェイク結果を切り替える
    pub fn set_handshake_mode(&self, mode: HandshakeMode) {
        self.inner.state.lock().mode = mode;
    }

    /// 変更イベントを購読中の全チャンネルに配送
    pub fn publish(&self, event: ChangeEvent) {
        let channels: Vec<Arc<InMemoryChannel>> =
            self.inner.state.lock().channels.values().cloned().collect();
        for channel in channels {
            channel.core.dispatch(&event);
        }
        // 受信者がいない場合のエラーは無視
        let _ = self.inner.tap.send(event);
    }

    /// 発行された全イベントを受け取る（チャンネルを介さない購読）
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.tap.subscribe()
    }

    /// 指定トピックのチャンネルに状態を通知する（切断の再現用）
    pub fn emit_status(&self, topic: &str, status: SubscribeStatus) -> bool {
        let channel = self.inner.state.lock().channels.get(topic).cloned();
        match channel {
            Some(channel) => {
                channel.core.notify_status(status);
                true
            }
            None => false,
        }
    }

    /// これまでに開かれたチャンネル数
    pub fn opened_channels(&self) -> usize {
        self.inner.state.lock().opened
    }

    /// 解放されていないチャンネル数
    pub fn live_channels(&self) -> usize {
        self.inner.state.lock().channels.len()
    }

    /// 指定トピックのチャンネルに登録されているリスナー数
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .state
            .lock()
            .channels
            .get(topic)
            .map(|channel| channel.core.listener_count())
            .unwrap_or(0)
    }

    /// 指定トピックのチャンネルが購読中かどうか
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .state
            .lock()
            .channels
            .get(topic)
            .is_some_and(|channel| channel.core.phase() == Phase::Subscribed)
    }
}

impl ChangeFeed for InMemoryChangeFeed {
    fn open_channel(&self, topic: &str) -> Result<Arc<dyn ChannelHandle>, FeedError> {
        let mut state = self.inner.state.lock();
        if state.channels.contains_key(topic) {
            return Err(FeedError::TopicInUse(topic.to_string()));
        }

        let channel = Arc::new(InMemoryChannel {
            core: ChannelCore::new(topic),
            feed: Arc::downgrade(&self.inner),
        });
        state.channels.insert(topic.to_string(), channel.clone());
        state.opened += 1;
        tracing::debug!("Channel opened: {}", topic);
        Ok(channel)
    }

    fn release_channel(&self, handle: &Arc<dyn ChannelHandle>) {
        let removed = {
            let mut state = self.inner.state.lock();
            // 同名の新しいチャンネルを誤って解放しないよう同一性を確認
            let same = state.channels.get(handle.topic()).is_some_and(|channel| {
                std::ptr::addr_eq(Arc::as_ptr(channel), Arc::as_ptr(handle))
            });
            if same {
                state.channels.remove(handle.topic())
            } else {
                None
            }
        };

        if let Some(channel) = removed {
            channel.core.close();
            tracing::debug!("Channel released: {}", channel.core.topic());
        }
    }
}

struct InMemoryChannel {
    core: ChannelCore,
    feed: std::sync::Weak<FeedInner>,
}

impl ChannelHandle for InMemoryChannel {
    fn topic(&self) -> &str {
        self.core.topic()
    }

    fn on_change(&self, table: &str, event: EventFilter, callback: ChangeCallback) {
        self.core.add_listener(table, event, callback);
    }

    fn off(&self, table: &str, event: EventFilter) {
        self.core.remove_listeners(table, event);
    }

    fn subscribe(&self, callback: StatusCallback) {
        self.core.begin_join(callback);
        let mode = match self.feed.upgrade() {
            Some(feed) => feed.state.lock().mode,
            None => HandshakeMode::Reject(SubscribeStatus::ChannelError),
        };
        match mode {
            HandshakeMode::Accept => self.core.notify_status(SubscribeStatus::Subscribed),
            HandshakeMode::Reject(status) => self.core.notify_status(status),
            HandshakeMode::Silent => {}
        }
    }

    fn unsubscribe(&self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn subscribed_channel(
        feed: &InMemoryChangeFeed,
        topic: &str,
        counter: &Arc<AtomicUsize>,
    ) -> Arc<dyn ChannelHandle> {
        let channel = feed.open_channel(topic).unwrap();
        let counter = counter.clone();
        channel.on_change(
            "live_chat_messages",
            EventFilter::Insert,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.subscribe(Arc::new(|_| {}));
        channel
    }

    #[test]
    fn test_publish_reaches_subscribed_channels() {
        // テスト項目: 購読中のチャンネルに変更イベントが届く
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _channel = subscribed_channel(&feed, "chat", &counter);

        // when (操作):
        feed.publish(ChangeEvent::insert(
            "live_chat_messages",
            json!({"id": "m1"}),
        ));

        // then (期待する結果):
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(feed.is_subscribed("chat"));
    }

    #[test]
    fn test_duplicate_topic_is_rejected() {
        // テスト項目: 同じトピックのチャンネルを二重に開けない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let _channel = feed.open_channel("chat").unwrap();

        // when (操作):
        let result = feed.open_channel("chat");

        // then (期待する結果):
        assert!(matches!(result, Err(FeedError::TopicInUse(topic)) if topic == "chat"));
    }

    #[test]
    fn test_release_allows_reopening_topic() {
        // テスト項目: 解放したトピックは再び開ける
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let channel = feed.open_channel("chat").unwrap();

        // when (操作):
        feed.release_channel(&channel);
        let reopened = feed.open_channel("chat");

        // then (期待する結果):
        assert!(reopened.is_ok());
        assert_eq!(feed.opened_channels(), 2);
        assert_eq!(feed.live_channels(), 1);
    }

    #[test]
    fn test_released_channel_stops_receiving() {
        // テスト項目: 解放したチャンネルにはイベントが届かない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let channel = subscribed_channel(&feed, "chat", &counter);

        // when (操作):
        feed.release_channel(&channel);
        feed.publish(ChangeEvent::insert(
            "live_chat_messages",
            json!({"id": "m1"}),
        ));

        // then (期待する結果):
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(feed.live_channels(), 0);
    }

    #[test]
    fn test_reject_mode_reports_failure_status() {
        // テスト項目: Reject モードではハンドシェイクが失敗ステータスになる
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Reject(SubscribeStatus::TimedOut));
        let channel = feed.open_channel("chat").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        // when (操作):
        channel.subscribe(Arc::new(move |status| sink.lock().push(status)));

        // then (期待する結果):
        assert_eq!(*seen.lock(), vec![SubscribeStatus::TimedOut]);
        assert!(!feed.is_subscribed("chat"));
    }

    #[test]
    fn test_emit_status_simulates_drop() {
        // テスト項目: emit_status で購読中のチャンネルに切断を通知できる
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let channel = feed.open_channel("chat").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.subscribe(Arc::new(move |status| sink.lock().push(status)));

        // when (操作):
        let delivered = feed.emit_status("chat", SubscribeStatus::ChannelError);

        // then (期待する結果):
        assert!(delivered);
        assert_eq!(
            *seen.lock(),
            vec![SubscribeStatus::Subscribed, SubscribeStatus::ChannelError]
        );
        assert!(!feed.emit_status("missing", SubscribeStatus::Closed));
    }

    #[tokio::test]
    async fn test_subscribe_all_receives_every_event() {
        // テスト項目: subscribe_all でチャンネルを介さずに全イベントを受け取れる
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let mut rx = feed.subscribe_all();

        // when (操作):
        feed.publish(ChangeEvent::delete("live_stream", json!({"id": 1})));

        // then (期待する結果):
        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, "live_stream");
    }
}
