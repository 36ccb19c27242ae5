//! UseCase: チャットメッセージの同期
//!
//! ## 処理の流れ
//!
//! 1. 起動時に直近 `message_limit` 件を取得し、作成日時の昇順で一覧を置き換える
//! 2. 接続後は INSERT / UPDATE / DELETE を一覧に反映する
//! 3. 一覧の末尾付近を見ていれば自動スクロール、そうでなければ未読数を数える
//!
//! ## 不変条件
//!
//! - メッセージの同一性は ID で判定し、同じ INSERT を何度受け取っても重複しない
//! - 取得中に届いた変更（INSERT / UPDATE / DELETE / 全削除）は届いた順に取得結果へ
//!   適用し直す。取得結果が古くても、削除済みのメッセージは復活しない

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use carrera_shared::time::Clock;

use crate::{
    config::{ConnectionConfig, RealtimeConfig},
    domain::{
        CHAT_MESSAGES_TABLE, ChangeEvent, ChangeFeed, ChangeKind, ChatMessage, ChatWindow,
        ConnectionState, DEFAULT_AUTHOR, EventFilter, Filter, InsertOutcome, Query, RecordStore,
        StoreError, decode_record,
    },
};

use super::{
    connection_manager::{ConnectionManager, Reconnect},
    error::SyncError,
};

/// スクロール要求の保持数
const SCROLL_REQUEST_CAPACITY: usize = 16;

/// チャット同期のオプション
#[derive(Debug, Clone)]
pub struct ChatSyncOptions {
    pub enabled: bool,
    /// 保持するメッセージの上限
    pub message_limit: usize,
    pub auto_scroll: bool,
    /// 末尾付近とみなす距離（px）
    pub scroll_threshold: f64,
    pub connection: ConnectionConfig,
}

impl ChatSyncOptions {
    /// 視聴者向けチャット
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            enabled: true,
            message_limit: config.chat_message_limit,
            auto_scroll: config.auto_scroll,
            scroll_threshold: config.scroll_threshold,
            connection: config.chat_connection(&config.channels.live_chat),
        }
    }

    /// 管理者コンソール
    pub fn admin(config: &RealtimeConfig) -> Self {
        Self {
            message_limit: config.admin_chat_message_limit,
            connection: config.chat_connection(&config.channels.admin_chat),
            ..Self::from_config(config)
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_message_limit(mut self, message_limit: usize) -> Self {
        self.message_limit = message_limit;
        self
    }

    pub fn with_auto_scroll(mut self, auto_scroll: bool) -> Self {
        self.auto_scroll = auto_scroll;
        self
    }
}

impl Default for ChatSyncOptions {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

/// 表示用のチャット状態
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatView {
    /// 作成日時の昇順
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// 末尾から離れている間に届いたメッセージ数
    pub new_message_count: usize,
}

/// スクロールコンテナの位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

/// 表示側への要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollRequest {
    /// 末尾までスクロールする（`forced` は自動スクロール設定を無視した要求）
    ToBottom { forced: bool },
}

/// 利用者が一覧の末尾付近を見ているかを追跡する
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTracker {
    threshold: f64,
    near_bottom: bool,
}

impl ScrollTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            near_bottom: true,
        }
    }

    /// 位置を記録し、末尾付近かどうかを返す
    pub fn observe(&mut self, event: ScrollEvent) -> bool {
        self.near_bottom =
            event.scroll_height - event.scroll_top <= event.client_height + self.threshold;
        self.near_bottom
    }

    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }
}

/// 取得中に一覧へ加えた変更（取得結果に同じ順で適用し直す）
#[derive(Debug, Clone)]
enum PendingChange {
    Insert(ChatMessage),
    Update(ChatMessage),
    Delete(String),
    Clear,
}

impl PendingChange {
    fn apply(self, window: &mut ChatWindow) {
        match self {
            Self::Insert(message) => {
                window.insert(message);
            }
            Self::Update(message) => {
                window.update(message);
            }
            Self::Delete(id) => {
                window.remove(&id);
            }
            Self::Clear => window.clear(),
        }
    }
}

struct ChatState {
    window: ChatWindow,
    is_loading: bool,
    error: Option<String>,
    new_message_count: usize,
    tracker: ScrollTracker,
    fetches_in_flight: usize,
    pending: Vec<PendingChange>,
}

impl ChatState {
    fn record(&mut self, change: PendingChange) {
        if self.fetches_in_flight > 0 {
            self.pending.push(change);
        }
    }

    fn view(&self) -> ChatView {
        ChatView {
            messages: self.window.messages().to_vec(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            new_message_count: self.new_message_count,
        }
    }
}

/// 変更イベントのハンドラーと操作で共有する状態
struct ChatShared {
    state: Mutex<ChatState>,
    view: watch::Sender<ChatView>,
    scroll: broadcast::Sender<ScrollRequest>,
    auto_scroll: bool,
}

impl ChatShared {
    /// 状態を更新して表示に反映する
    fn mutate<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        self.view.send_replace(state.view());
        result
    }

    fn request_scroll(&self, forced: bool) {
        // 表示側が購読していない場合は捨てる
        let _ = self.scroll.send(ScrollRequest::ToBottom { forced });
    }

    fn on_change(&self, change: &ChangeEvent) {
        match change.kind {
            ChangeKind::Insert => self.on_insert(change),
            ChangeKind::Update => self.on_update(change),
            ChangeKind::Delete => self.on_delete(change),
        }
    }

    fn on_insert(&self, change: &ChangeEvent) {
        let message = match change.decode_new::<ChatMessage>() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring malformed chat INSERT: {}", e);
                return;
            }
        };
        tracing::debug!("New chat message {} from {}", message.id, message.author);

        let scroll = self.mutate(|state| {
            state.record(PendingChange::Insert(message.clone()));
            match state.window.insert(message) {
                InsertOutcome::Duplicate => false,
                InsertOutcome::Appended if state.tracker.is_near_bottom() => true,
                InsertOutcome::Appended => {
                    state.new_message_count += 1;
                    false
                }
            }
        });

        if scroll && self.auto_scroll {
            self.request_scroll(false);
        }
    }

    fn on_update(&self, change: &ChangeEvent) {
        match change.decode_new::<ChatMessage>() {
            Ok(message) => {
                tracing::debug!("Chat message updated: {}", message.id);
                self.mutate(|state| {
                    state.record(PendingChange::Update(message.clone()));
                    state.window.update(message)
                });
            }
            Err(e) => tracing::warn!("Ignoring malformed chat UPDATE: {}", e),
        }
    }

    fn on_delete(&self, change: &ChangeEvent) {
        match change.old_id() {
            Some(id) => {
                tracing::debug!("Chat message deleted: {}", id);
                self.mutate(|state| {
                    state.record(PendingChange::Delete(id.clone()));
                    state.window.remove(&id)
                });
            }
            None => tracing::warn!("Ignoring chat DELETE without id"),
        }
    }
}

/// チャットメッセージの同期コントローラー
#[derive(Clone)]
pub struct ChatSync {
    shared: Arc<ChatShared>,
    store: Arc<dyn RecordStore>,
    connection: ConnectionManager,
    enabled: bool,
    message_limit: usize,
}

impl ChatSync {
    pub fn new(
        options: ChatSyncOptions,
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = ChatState {
            window: ChatWindow::new(options.message_limit),
            is_loading: true,
            error: None,
            new_message_count: 0,
            tracker: ScrollTracker::new(options.scroll_threshold),
            fetches_in_flight: 0,
            pending: Vec::new(),
        };
        let (view, _) = watch::channel(state.view());
        let (scroll, _) = broadcast::channel(SCROLL_REQUEST_CAPACITY);
        let shared = Arc::new(ChatShared {
            state: Mutex::new(state),
            view,
            scroll,
            auto_scroll: options.auto_scroll,
        });

        let connection = ConnectionManager::new(options.connection, feed, clock);
        for event in [EventFilter::Insert, EventFilter::Delete, EventFilter::Update] {
            let shared = shared.clone();
            connection.bind(
                CHAT_MESSAGES_TABLE,
                event,
                Arc::new(move |change| shared.on_change(&change)),
            );
        }

        Self {
            shared,
            store,
            connection,
            enabled: options.enabled,
            message_limit: options.message_limit,
        }
    }

    /// 同期を開始する（無効な場合は切断だけ行う）
    pub async fn activate(&self) {
        if !self.enabled {
            self.connection.disconnect().await;
            return;
        }

        self.connection.connect().await;
        self.refresh_messages().await;
    }

    pub async fn deactivate(&self) {
        self.connection.disconnect().await;
    }

    /// 直近のメッセージを取得し直し、一覧を置き換える
    pub async fn refresh_messages(&self) {
        self.shared.mutate(|state| {
            state.is_loading = true;
            state.error = None;
            state.fetches_in_flight += 1;
        });

        let result = self.fetch_recent().await;

        let loaded = self.shared.mutate(|state| {
            state.fetches_in_flight -= 1;
            let pending = if state.fetches_in_flight == 0 {
                std::mem::take(&mut state.pending)
            } else {
                state.pending.clone()
            };
            state.is_loading = false;

            match result {
                Ok(messages) => {
                    tracing::info!("Loaded {} chat message(s)", messages.len());
                    state.window.replace(messages);
                    for change in pending {
                        change.apply(&mut state.window);
                    }
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch chat messages: {}", e);
                    state.error = Some(e.to_string());
                    false
                }
            }
        });

        if loaded && self.shared.auto_scroll {
            self.shared.request_scroll(true);
        }
    }

    /// 直近 `message_limit` 件を作成日時の昇順で返す
    async fn fetch_recent(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let query = Query::ordered_by("created_at", false).limit(self.message_limit);
        let records = self.store.fetch_many(CHAT_MESSAGES_TABLE, query).await?;
        let mut messages = records
            .into_iter()
            .map(decode_record::<ChatMessage>)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// ストアの全メッセージを削除し、表示も空にする
    ///
    /// 削除イベントの到着を待たずに一覧を空にする。
    pub async fn clear_messages(&self) -> Result<(), SyncError> {
        let all = Filter::neq("id", Uuid::nil().to_string());
        match self.store.delete(CHAT_MESSAGES_TABLE, all).await {
            Ok(()) => {
                tracing::info!("Cleared all chat messages");
                self.shared.mutate(|state| {
                    state.record(PendingChange::Clear);
                    state.window.clear();
                    state.new_message_count = 0;
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to clear chat messages: {}", e);
                self.shared.mutate(|state| state.error = Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// メッセージを送信する
    ///
    /// 一覧には追加しない（変更フィードの INSERT で反映される）。
    pub async fn send_message(
        &self,
        author: Option<&str>,
        text: &str,
    ) -> Result<ChatMessage, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let author = author
            .map(str::trim)
            .filter(|author| !author.is_empty())
            .unwrap_or(DEFAULT_AUTHOR);

        let result = match self
            .store
            .insert(CHAT_MESSAGES_TABLE, json!({"message": text, "author": author}))
            .await
        {
            Ok(record) => decode_record::<ChatMessage>(record),
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            tracing::warn!("Failed to send chat message: {}", e);
            self.shared.mutate(|state| state.error = Some(e.to_string()));
            SyncError::from(e)
        })
    }

    /// スクロール位置を記録し、末尾付近に戻ったら未読数をリセットする
    pub fn handle_scroll(&self, event: ScrollEvent) {
        self.shared.mutate(|state| {
            if state.tracker.observe(event) {
                state.new_message_count = 0;
            }
        });
    }

    /// 末尾まで強制的にスクロールし、未読数をリセットする
    pub fn scroll_to_bottom_manually(&self) {
        self.shared.request_scroll(true);
        self.shared.mutate(|state| state.new_message_count = 0);
    }

    pub fn view(&self) -> ChatView {
        self.shared.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.shared.view.subscribe()
    }

    /// スクロール要求を受け取る
    pub fn scroll_requests(&self) -> broadcast::Receiver<ScrollRequest> {
        self.shared.scroll.subscribe()
    }

    pub fn scroll_tracker(&self) -> ScrollTracker {
        self.shared.state.lock().tracker
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.view.borrow().messages.clone()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.state().is_connected()
    }

    pub async fn reconnect(&self) {
        self.connection.reconnect().await;
    }
}

#[async_trait]
impl Reconnect for ChatSync {
    async fn reconnect(&self) {
        ChatSync::reconnect(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MockRecordStore, Record},
        infrastructure::{feed::InMemoryChangeFeed, store::InMemoryRecordStore},
    };
    use carrera_shared::time::FixedClock;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::{sync::Notify, time::timeout};

    const WAIT: Duration = Duration::from_secs(60);

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::from_millis(1_714_564_800_000))
    }

    fn row(id: &str, text: &str, second: u32) -> Value {
        json!({
            "id": id,
            "message": text,
            "author": "Marta",
            "created_at": format!("2024-05-01T12:00:{:02}Z", second),
        })
    }

    fn ids(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    async fn connected_sync(
        feed: &InMemoryChangeFeed,
        store: &InMemoryRecordStore,
        options: ChatSyncOptions,
    ) -> ChatSync {
        let sync = ChatSync::new(
            options,
            Arc::new(store.clone()),
            Arc::new(feed.clone()),
            clock(),
        );
        sync.activate().await;
        timeout(WAIT, sync.connection().wait_for(|s| s.is_connected()))
            .await
            .unwrap();
        sync
    }

    fn backend() -> (InMemoryChangeFeed, InMemoryRecordStore) {
        let feed = InMemoryChangeFeed::new();
        let store = InMemoryRecordStore::with_feed(feed.clone());
        (feed, store)
    }

    #[test]
    fn test_scroll_tracker_threshold() {
        // テスト項目: 末尾からの距離がしきい値以内なら末尾付近と判定する
        // given (前提条件):
        let mut tracker = ScrollTracker::new(100.0);

        // when (操作):
        let at_threshold = tracker.observe(ScrollEvent {
            scroll_top: 400.0,
            scroll_height: 1000.0,
            client_height: 500.0,
        });
        let away = tracker.observe(ScrollEvent {
            scroll_top: 399.0,
            scroll_height: 1000.0,
            client_height: 500.0,
        });

        // then (期待する結果):
        assert!(at_threshold);
        assert!(!away);
        assert!(!tracker.is_near_bottom());
    }

    #[tokio::test]
    async fn test_activate_loads_most_recent_messages_ascending() {
        // テスト項目: 起動時に直近 N 件を昇順で取得し、強制スクロールを要求する
        // given (前提条件):
        let (feed, store) = backend();
        for (id, second) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            store.insert(CHAT_MESSAGES_TABLE, row(id, id, second)).await.unwrap();
        }
        let sync = ChatSync::new(
            ChatSyncOptions::default().with_message_limit(3),
            Arc::new(store),
            Arc::new(feed),
            clock(),
        );
        let mut scroll = sync.scroll_requests();

        // when (操作):
        sync.activate().await;

        // then (期待する結果):
        let view = sync.view();
        assert_eq!(ids(&view.messages), vec!["b", "c", "d"]);
        assert!(!view.is_loading);
        assert_eq!(
            scroll.try_recv().unwrap(),
            ScrollRequest::ToBottom { forced: true }
        );
    }

    #[tokio::test]
    async fn test_insert_beyond_limit_drops_oldest() {
        // テスト項目: 上限 3 件、起動時の取得が [m1, m2] の状態で m3, m4 の INSERT が届くと最古の m1 が消える
        // given (前提条件):
        let (feed, store) = backend();
        for (id, second) in [("m1", 1), ("m2", 2)] {
            store.insert(CHAT_MESSAGES_TABLE, row(id, id, second)).await.unwrap();
        }
        let sync =
            connected_sync(&feed, &store, ChatSyncOptions::default().with_message_limit(3)).await;
        assert_eq!(ids(&sync.messages()), vec!["m1", "m2"]);

        // when (操作):
        store.insert(CHAT_MESSAGES_TABLE, row("m3", "m3", 3)).await.unwrap();
        store.insert(CHAT_MESSAGES_TABLE, row("m4", "m4", 4)).await.unwrap();

        // then (期待する結果):
        assert_eq!(ids(&sync.messages()), vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_repeated_insert_does_not_duplicate() {
        // テスト項目: 同じ ID の INSERT を 2 回受け取っても 1 件のまま
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        let event = ChangeEvent::insert(CHAT_MESSAGES_TABLE, row("m1", "hola", 1));

        // when (操作):
        feed.publish(event.clone());
        feed.publish(event);

        // then (期待する結果):
        assert_eq!(ids(&sync.messages()), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_of_unknown_id_are_noops() {
        // テスト項目: 一覧にない ID の UPDATE / DELETE は何もしない
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        feed.publish(ChangeEvent::insert(CHAT_MESSAGES_TABLE, row("m1", "hola", 1)));
        let before = sync.view();

        // when (操作):
        feed.publish(ChangeEvent::update(
            CHAT_MESSAGES_TABLE,
            row("zz", "old", 2),
            row("zz", "new", 2),
        ));
        feed.publish(ChangeEvent::delete(CHAT_MESSAGES_TABLE, json!({"id": "zz"})));

        // then (期待する結果):
        assert_eq!(sync.view(), before);
    }

    #[tokio::test]
    async fn test_update_replaces_in_place_and_delete_removes() {
        // テスト項目: UPDATE は同じ位置で置き換え、DELETE は ID で削除する
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        for (id, second) in [("m1", 1), ("m2", 2), ("m3", 3)] {
            store.insert(CHAT_MESSAGES_TABLE, row(id, id, second)).await.unwrap();
        }

        // when (操作):
        store
            .update(CHAT_MESSAGES_TABLE, Filter::eq("id", "m2"), json!({"message": "editado"}))
            .await
            .unwrap();
        store
            .delete(CHAT_MESSAGES_TABLE, Filter::eq("id", "m1"))
            .await
            .unwrap();

        // then (期待する結果):
        let messages = sync.messages();
        assert_eq!(ids(&messages), vec!["m2", "m3"]);
        assert_eq!(messages[0].message, "editado");
        assert!(messages[0].updated_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_away_from_bottom_counts_unseen() {
        // テスト項目: 末尾から離れている間の INSERT は未読数になり、末尾に戻ると 0 になる
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        let mut scroll = sync.scroll_requests();
        sync.handle_scroll(ScrollEvent {
            scroll_top: 0.0,
            scroll_height: 2000.0,
            client_height: 500.0,
        });

        // when (操作):
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        store.insert(CHAT_MESSAGES_TABLE, row("m2", "dos", 2)).await.unwrap();
        let unseen = sync.view().new_message_count;
        sync.handle_scroll(ScrollEvent {
            scroll_top: 1500.0,
            scroll_height: 2000.0,
            client_height: 500.0,
        });

        // then (期待する結果):
        assert_eq!(unseen, 2);
        assert_eq!(sync.view().new_message_count, 0);
        assert!(scroll.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_insert_near_bottom_requests_scroll() {
        // テスト項目: 末尾付近での INSERT は自動スクロールを要求する
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        let mut scroll = sync.scroll_requests();

        // when (操作):
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();

        // then (期待する結果):
        assert_eq!(
            scroll.try_recv().unwrap(),
            ScrollRequest::ToBottom { forced: false }
        );
        assert_eq!(sync.view().new_message_count, 0);
    }

    #[tokio::test]
    async fn test_scroll_to_bottom_manually_resets_unseen() {
        // テスト項目: 手動スクロールで強制スクロールを要求し、未読数を 0 にする
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(
            &feed,
            &store,
            ChatSyncOptions::default().with_auto_scroll(false),
        )
        .await;
        sync.handle_scroll(ScrollEvent {
            scroll_top: 0.0,
            scroll_height: 2000.0,
            client_height: 500.0,
        });
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        let mut scroll = sync.scroll_requests();

        // when (操作):
        sync.scroll_to_bottom_manually();

        // then (期待する結果):
        assert_eq!(
            scroll.try_recv().unwrap(),
            ScrollRequest::ToBottom { forced: true }
        );
        assert_eq!(sync.view().new_message_count, 0);
    }

    #[tokio::test]
    async fn test_clear_messages_empties_store_and_view() {
        // テスト項目: 全削除でストアと表示の両方が空になる
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;
        for (id, second) in [("m1", 1), ("m2", 2)] {
            store.insert(CHAT_MESSAGES_TABLE, row(id, id, second)).await.unwrap();
        }

        // when (操作):
        let result = sync.clear_messages().await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert!(sync.messages().is_empty());
        assert_eq!(store.row_count(CHAT_MESSAGES_TABLE), 0);
    }

    #[tokio::test]
    async fn test_clear_failure_keeps_messages_and_reports_error() {
        // テスト項目: 全削除に失敗すると一覧は残り、エラーが返される
        // given (前提条件):
        let mut store = MockRecordStore::new();
        store
            .expect_fetch_many()
            .returning(|_, _| Ok(vec![row("m1", "uno", 1)]));
        store
            .expect_delete()
            .returning(|_, _| Err(StoreError::Transport("timeout".to_string())));
        let sync = ChatSync::new(
            ChatSyncOptions::default(),
            Arc::new(store),
            Arc::new(InMemoryChangeFeed::new()),
            clock(),
        );
        sync.activate().await;

        // when (操作):
        let result = sync.clear_messages().await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::Transport(_)))
        ));
        let view = sync.view();
        assert_eq!(ids(&view.messages), vec!["m1"]);
        assert!(view.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_error() {
        // テスト項目: 取得に失敗すると一覧は空のままエラーが表示される
        // given (前提条件):
        let mut store = MockRecordStore::new();
        store
            .expect_fetch_many()
            .returning(|_, _| Err(StoreError::Transport("offline".to_string())));
        let sync = ChatSync::new(
            ChatSyncOptions::default(),
            Arc::new(store),
            Arc::new(InMemoryChangeFeed::new()),
            clock(),
        );

        // when (操作):
        sync.activate().await;

        // then (期待する結果):
        let view = sync.view();
        assert!(view.messages.is_empty());
        assert!(!view.is_loading);
        assert!(view.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_send_message_trims_and_defaults_author() {
        // テスト項目: 送信は前後の空白を除き、投稿者が空なら Admin になる
        // given (前提条件):
        let (feed, store) = backend();
        let sync = connected_sync(&feed, &store, ChatSyncOptions::default()).await;

        // when (操作):
        let sent = sync.send_message(Some("  "), "  ¡Salida!  ").await.unwrap();

        // then (期待する結果):
        assert_eq!(sent.message, "¡Salida!");
        assert_eq!(sent.author, "Admin");
        // 一覧にはフィード経由で 1 件だけ反映される
        assert_eq!(ids(&sync.messages()), vec![sent.id.as_str()]);
    }

    #[tokio::test]
    async fn test_send_empty_message_is_rejected() {
        // テスト項目: 空白だけのメッセージは送信しない
        // given (前提条件):
        let mut store = MockRecordStore::new();
        store.expect_insert().times(0);
        store.expect_fetch_many().returning(|_, _| Ok(Vec::new()));
        let sync = ChatSync::new(
            ChatSyncOptions::default(),
            Arc::new(store),
            Arc::new(InMemoryChangeFeed::new()),
            clock(),
        );

        // when (操作):
        let result = sync.send_message(None, "   ").await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), SyncError::EmptyMessage);
    }

    /// 取得結果を確定した後、合図があるまで返さないストア
    struct GatedStore {
        inner: InMemoryRecordStore,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn fetch_one(&self, table: &str, filter: Option<Filter>) -> Result<Record, StoreError> {
            self.inner.fetch_one(table, filter).await
        }

        async fn fetch_many(&self, table: &str, query: Query) -> Result<Vec<Record>, StoreError> {
            let rows = self.inner.fetch_many(table, query).await;
            self.gate.notified().await;
            rows
        }

        async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
            self.inner.insert(table, record).await
        }

        async fn update(&self, table: &str, filter: Filter, patch: Record) -> Result<(), StoreError> {
            self.inner.update(table, filter, patch).await
        }

        async fn delete(&self, table: &str, filter: Filter) -> Result<(), StoreError> {
            self.inner.delete(table, filter).await
        }
    }

    /// 接続済みで、次の取得が合図まで止まるコントローラー
    async fn gated_sync(
        feed: &InMemoryChangeFeed,
        store: &InMemoryRecordStore,
    ) -> (ChatSync, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let sync = ChatSync::new(
            ChatSyncOptions::default(),
            Arc::new(GatedStore {
                inner: store.clone(),
                gate: gate.clone(),
            }),
            Arc::new(feed.clone()),
            clock(),
        );
        sync.connection().connect().await;
        timeout(WAIT, sync.connection().wait_for(|s| s.is_connected()))
            .await
            .unwrap();
        gate.notify_one();
        sync.refresh_messages().await;
        (sync, gate)
    }

    /// 取得結果を確定させた状態で止まっている再取得を始める
    async fn start_refresh(sync: &ChatSync) -> tokio::task::JoinHandle<()> {
        let refresh = tokio::spawn({
            let sync = sync.clone();
            async move { sync.refresh_messages().await }
        });
        let mut view = sync.subscribe();
        timeout(WAIT, view.wait_for(|v| v.is_loading)).await.unwrap().unwrap();
        refresh
    }

    #[tokio::test]
    async fn test_insert_during_fetch_is_merged() {
        // テスト項目: 取得中に届いた INSERT は取得結果にマージされる
        // given (前提条件):
        let (feed, store) = backend();
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        let (sync, gate) = gated_sync(&feed, &store).await;
        let refresh = start_refresh(&sync).await;

        // when (操作):
        store.insert(CHAT_MESSAGES_TABLE, row("m2", "dos", 2)).await.unwrap();
        gate.notify_one();
        refresh.await.unwrap();

        // then (期待する結果):
        assert_eq!(ids(&sync.messages()), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_delete_during_fetch_is_not_undone() {
        // テスト項目: 取得中に削除されたメッセージは、古い取得結果で復活しない
        // given (前提条件):
        let (feed, store) = backend();
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        store.insert(CHAT_MESSAGES_TABLE, row("m2", "dos", 2)).await.unwrap();
        let (sync, gate) = gated_sync(&feed, &store).await;
        let refresh = start_refresh(&sync).await;

        // when (操作):
        store
            .delete(CHAT_MESSAGES_TABLE, Filter::eq("id", "m1"))
            .await
            .unwrap();
        gate.notify_one();
        refresh.await.unwrap();

        // then (期待する結果):
        assert_eq!(ids(&sync.messages()), vec!["m2"]);
        assert_eq!(store.row_count(CHAT_MESSAGES_TABLE), 1);
    }

    #[tokio::test]
    async fn test_clear_during_fetch_is_not_undone() {
        // テスト項目: 取得中に全削除すると、古い取得結果は反映されず、その後の INSERT だけが残る
        // given (前提条件):
        let (feed, store) = backend();
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        store.insert(CHAT_MESSAGES_TABLE, row("m2", "dos", 2)).await.unwrap();
        let (sync, gate) = gated_sync(&feed, &store).await;
        let refresh = start_refresh(&sync).await;

        // when (操作):
        sync.clear_messages().await.unwrap();
        store.insert(CHAT_MESSAGES_TABLE, row("m3", "tres", 3)).await.unwrap();
        gate.notify_one();
        refresh.await.unwrap();

        // then (期待する結果):
        assert_eq!(ids(&sync.messages()), vec!["m3"]);
    }

    #[tokio::test]
    async fn test_update_during_fetch_is_kept() {
        // テスト項目: 取得中に届いた UPDATE は古い取得結果で上書きされない
        // given (前提条件):
        let (feed, store) = backend();
        store.insert(CHAT_MESSAGES_TABLE, row("m1", "uno", 1)).await.unwrap();
        let (sync, gate) = gated_sync(&feed, &store).await;
        let refresh = start_refresh(&sync).await;

        // when (操作):
        store
            .update(CHAT_MESSAGES_TABLE, Filter::eq("id", "m1"), json!({"message": "editado"}))
            .await
            .unwrap();
        gate.notify_one();
        refresh.await.unwrap();

        // then (期待する結果):
        let messages = sync.messages();
        assert_eq!(ids(&messages), vec!["m1"]);
        assert_eq!(messages[0].message, "editado");
    }
}
