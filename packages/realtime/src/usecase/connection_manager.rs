//! 接続マネージャー
//!
//! 1 つのトピックについて、チャンネルの作成・購読・切断・再接続を管理します。
//!
//! ## 構成
//!
//! - `ConnectionManager`: 利用側が持つハンドル（クローン可能）
//! - `Driver`: チャンネル、タイマー、状態を所有するタスク
//!
//! すべての操作は `Command` としてキューに積まれ、`Driver` が 1 つずつ処理します。
//! チャンネルからのコールバックは状態を直接変更せず、試行ごとの世代番号を付けて
//! コマンドを積むだけです。解放済みのチャンネルから遅れて届いた通知は、
//! 世代番号が一致しないため無視されます。
//!
//! 最後のハンドルが破棄されると `Driver` はチャンネルを解放して終了します。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use carrera_shared::time::Clock;

use crate::{
    config::ConnectionConfig,
    domain::{
        ChangeCallback, ChangeFeed, ChannelHandle, ConnectionState, ConnectionStatus,
        EventFilter, FailureOutcome, RetryPolicy, SubscribeStatus,
    },
};

/// 手動の再接続要求を受け付けるもの
///
/// ステータス表示の「再試行」ボタンから呼び出される。
#[async_trait]
pub trait Reconnect: Send + Sync {
    async fn reconnect(&self);
}

/// マネージャーが保持しているリソースの状況
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSnapshot {
    /// チャンネルを保持しているか
    pub has_channel: bool,
    /// 再試行タイマーが動いているか
    pub retry_pending: bool,
    /// ハンドシェイクの監視タイマーが動いているか
    pub handshake_pending: bool,
    /// 登録済みの変更リスナー数
    pub bindings: usize,
}

struct Binding {
    table: String,
    event: EventFilter,
    callback: ChangeCallback,
}

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<()>),
    Bind(Binding),
    Inspect(oneshot::Sender<ResourceSnapshot>),
    Handshake {
        generation: u64,
        status: SubscribeStatus,
    },
    RetryElapsed {
        generation: u64,
    },
    HandshakeTimeout {
        generation: u64,
    },
}

/// 接続マネージャーのハンドル
///
/// 作成時に tokio ランタイム上で `Driver` タスクを起動するため、
/// ランタイムの外で `new` を呼ぶとパニックする。
#[derive(Clone)]
pub struct ConnectionManager {
    channel_name: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::default());
        let channel_name: Arc<str> = Arc::from(config.channel_name.as_str());

        let driver = Driver {
            config,
            feed,
            clock,
            state: state_tx,
            commands: commands.downgrade(),
            channel: None,
            bindings: Vec::new(),
            generation: 0,
            retry_timer: None,
            handshake_timer: None,
        };
        tokio::spawn(driver.run(rx));

        Self {
            channel_name,
            commands,
            state,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// 現在の接続状態
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// 接続状態の変化を監視する
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// 接続を開始する
    ///
    /// 接続中・接続済みなら何もしない。`error` 状態からは `reconnect` が必要。
    pub async fn connect(&self) {
        self.request(Command::Connect).await;
    }

    /// 切断し、チャンネルとタイマーをすべて解放する
    pub async fn disconnect(&self) {
        self.request(Command::Disconnect).await;
    }

    /// 再試行回数をリセットして接続し直す
    pub async fn reconnect(&self) {
        self.request(Command::Reconnect).await;
    }

    /// 変更リスナーを登録する
    ///
    /// 登録はマネージャーの生存期間中保持され、チャンネルを作り直すたびに
    /// 新しいチャンネルへ登録し直される。
    pub fn bind(&self, table: &str, event: EventFilter, callback: ChangeCallback) {
        let binding = Binding {
            table: table.to_string(),
            event,
            callback,
        };
        if self.commands.send(Command::Bind(binding)).is_err() {
            tracing::warn!("Connection manager for {} is gone", self.channel_name);
        }
    }

    /// 保持しているリソースの状況を取得する
    pub async fn resources(&self) -> ResourceSnapshot {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Inspect(tx)).is_err() {
            return ResourceSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }

    /// 接続状態が条件を満たすまで待つ
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut state = self.state.clone();
        let result = state.wait_for(predicate).await.map(|current| current.clone());
        result.unwrap_or_else(|_| state.borrow().clone())
    }

    async fn request(&self, command: fn(oneshot::Sender<()>) -> Command) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(command(tx)).is_err() {
            tracing::warn!("Connection manager for {} is gone", self.channel_name);
            return;
        }
        let _ = rx.await;
    }
}

#[async_trait]
impl Reconnect for ConnectionManager {
    async fn reconnect(&self) {
        ConnectionManager::reconnect(self).await;
    }
}

struct Driver {
    config: ConnectionConfig,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::WeakUnboundedSender<Command>,
    channel: Option<Arc<dyn ChannelHandle>>,
    bindings: Vec<Binding>,
    /// チャンネルの作成・解放のたびに進める
    generation: u64,
    retry_timer: Option<JoinHandle<()>>,
    handshake_timer: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Connection manager started: {}", self.config.channel_name);

        while let Some(command) = rx.recv().await {
            self.handle(command);
        }

        // すべてのハンドルが破棄された
        self.cancel_timers();
        self.release_channel();
        self.update(|state| state.mark_disconnected());
        tracing::debug!("Connection manager stopped: {}", self.config.channel_name);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect(ack) => {
                self.connect();
                let _ = ack.send(());
            }
            Command::Disconnect(ack) => {
                self.disconnect();
                let _ = ack.send(());
            }
            Command::Reconnect(ack) => {
                tracing::info!("Manual reconnect requested: {}", self.config.channel_name);
                self.update(|state| state.reset_retries());
                self.attempt();
                let _ = ack.send(());
            }
            Command::Bind(binding) => {
                if let Some(channel) = &self.channel {
                    channel.on_change(&binding.table, binding.event, binding.callback.clone());
                }
                self.bindings.push(binding);
            }
            Command::Inspect(ack) => {
                let _ = ack.send(ResourceSnapshot {
                    has_channel: self.channel.is_some(),
                    retry_pending: self.retry_timer.is_some(),
                    handshake_pending: self.handshake_timer.is_some(),
                    bindings: self.bindings.len(),
                });
            }
            Command::Handshake { generation, status } => {
                if generation != self.generation {
                    tracing::debug!(
                        "Ignoring {} from a released channel: {}",
                        status,
                        self.config.channel_name
                    );
                    return;
                }
                self.on_handshake(status);
            }
            Command::RetryElapsed { generation } => {
                if generation != self.generation || self.retry_timer.is_none() {
                    return;
                }
                self.retry_timer = None;
                self.attempt();
            }
            Command::HandshakeTimeout { generation } => {
                if generation != self.generation || self.handshake_timer.is_none() {
                    return;
                }
                self.handshake_timer = None;
                tracing::warn!(
                    "Handshake timed out: {} ({:?})",
                    self.config.channel_name,
                    self.config.handshake_timeout
                );
                self.on_failure(SubscribeStatus::TimedOut);
            }
        }
    }

    fn connect(&mut self) {
        match self.state.borrow().status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                tracing::debug!("Already connecting or connected: {}", self.config.channel_name);
                return;
            }
            ConnectionStatus::Error => {
                tracing::warn!(
                    "Connection {} gave up after max retries, use reconnect to try again",
                    self.config.channel_name
                );
                return;
            }
            // 試行中（再試行タイマーなし）なら結果を待つ
            ConnectionStatus::Reconnecting if self.retry_timer.is_none() => return,
            ConnectionStatus::Reconnecting | ConnectionStatus::Disconnected => {}
        }
        self.attempt();
    }

    fn disconnect(&mut self) {
        self.cancel_timers();
        self.release_channel();
        self.update(|state| state.mark_disconnected());
    }

    /// 古いチャンネルを解放してから新しいチャンネルで購読を開始する
    fn attempt(&mut self) {
        self.cancel_timers();
        self.release_channel();
        self.update(|state| state.begin_attempt());

        let generation = self.generation;
        tracing::info!(
            "Attempting to subscribe to {} (retry {}/{})",
            self.config.channel_name,
            self.state.borrow().retry_count,
            self.config.retry.max_retries
        );

        let channel = match self.feed.open_channel(&self.config.channel_name) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Failed to open channel {}: {}", self.config.channel_name, e);
                self.on_failure(SubscribeStatus::ChannelError);
                return;
            }
        };

        for binding in &self.bindings {
            channel.on_change(&binding.table, binding.event, binding.callback.clone());
        }
        self.channel = Some(channel.clone());
        self.arm_watchdog(generation);

        let commands = self.commands.clone();
        channel.subscribe(Arc::new(move |status| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Handshake { generation, status });
            }
        }));
    }

    fn on_handshake(&mut self, status: SubscribeStatus) {
        if status == SubscribeStatus::Subscribed {
            if self.state.borrow().is_connected() {
                return;
            }
            if let Some(timer) = self.handshake_timer.take() {
                timer.abort();
            }
            let now = self.clock.now();
            self.update(|state| state.mark_connected(now));
            return;
        }

        tracing::warn!("Channel {} reported {}", self.config.channel_name, status);
        self.on_failure(status);
    }

    fn on_failure(&mut self, status: SubscribeStatus) {
        self.cancel_timers();
        self.release_channel();

        let policy = self.config.retry;
        let jitter_sample = RetryPolicy::sample_jitter();
        let outcome = self.update(|state| state.mark_failed(&policy, jitter_sample));

        match outcome {
            FailureOutcome::Retry { delay } => {
                tracing::info!(
                    "Retrying {} in {}ms after {}",
                    self.config.channel_name,
                    delay.as_millis(),
                    status
                );
                self.retry_timer = Some(self.schedule(delay, |generation| {
                    Command::RetryElapsed { generation }
                }));
            }
            FailureOutcome::Exhausted => {
                tracing::error!(
                    "Giving up on {} after {} retries",
                    self.config.channel_name,
                    policy.max_retries
                );
            }
        }
    }

    fn arm_watchdog(&mut self, generation: u64) {
        if let Some(timeout) = self.config.handshake_timeout {
            debug_assert_eq!(generation, self.generation);
            self.handshake_timer = Some(self.schedule(timeout, |generation| {
                Command::HandshakeTimeout { generation }
            }));
        }
    }

    /// `delay` 後に現在の世代のコマンドを積むタイマーを起動する
    fn schedule(&self, delay: Duration, command: fn(u64) -> Command) -> JoinHandle<()> {
        let generation = self.generation;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command(generation));
            }
        })
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.handshake_timer.take() {
            timer.abort();
        }
    }

    /// リスナーの解除、購読解除、チャンネルの解放の順に後始末する
    fn release_channel(&mut self) {
        self.generation += 1;
        if let Some(channel) = self.channel.take() {
            for binding in &self.bindings {
                channel.off(&binding.table, binding.event);
            }
            channel.unsubscribe();
            self.feed.release_channel(&channel);
            tracing::debug!("Released channel {}", self.config.channel_name);
        }
    }

    /// 状態を更新し、ステータスが変わったらログに残す
    fn update<R>(&self, f: impl FnOnce(&mut ConnectionState) -> R) -> R {
        let mut result = None;
        let mut transition = None;
        self.state.send_modify(|state| {
            let before = state.status;
            result = Some(f(state));
            if before != state.status {
                transition = Some((before, state.status));
            }
        });

        if let Some((from, to)) = transition {
            tracing::info!("Connection {}: {} -> {}", self.config.channel_name, from, to);
        }
        match result {
            Some(result) => result,
            None => unreachable!("send_modify always runs the closure"),
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.cancel_timers();
        self.release_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChangeEvent,
        infrastructure::feed::{HandshakeMode, InMemoryChangeFeed},
    };
    use carrera_shared::time::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Instant, timeout};

    const TOPIC: &str = "live_chat_messages_sync";
    const WAIT: Duration = Duration::from_secs(600);

    fn config(max_retries: u32) -> ConnectionConfig {
        ConnectionConfig::new(TOPIC)
            .with_retry(RetryPolicy::new(max_retries, Duration::from_millis(1000)))
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn manager(feed: &InMemoryChangeFeed, config: ConnectionConfig) -> ConnectionManager {
        ConnectionManager::new(config, Arc::new(feed.clone()), clock())
    }

    async fn wait_status(manager: &ConnectionManager, status: ConnectionStatus) -> ConnectionState {
        timeout(WAIT, manager.wait_for(|state| state.status == status))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reaches_connected() {
        // テスト項目: ハンドシェイク成功で connected になり、接続時刻が記録される
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));

        // when (操作):
        manager.connect().await;
        let state = wait_status(&manager, ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.error, None);
        assert_eq!(
            state.last_connected,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert!(feed.is_subscribed(TOPIC));
        let resources = manager.resources().await;
        assert!(resources.has_channel);
        assert!(!resources.handshake_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        // テスト項目: 接続済みで connect を呼んでもチャンネルを作り直さない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;

        // when (操作):
        manager.connect().await;
        manager.connect().await;

        // then (期待する結果):
        assert_eq!(feed.opened_channels(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_gives_up_after_max_retries() {
        // テスト項目: 失敗が続くと max_retries 回の再試行後に error になり、以後タイマーを持たない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Reject(SubscribeStatus::ChannelError));
        let manager = manager(&feed, config(3));
        let started = Instant::now();

        // when (操作):
        manager.connect().await;
        let state = wait_status(&manager, ConnectionStatus::Error).await;

        // then (期待する結果):
        assert_eq!(state.retry_count, 3);
        assert!(state.error.unwrap().contains("Max retries exceeded"));
        // 初回 + 再試行 3 回
        assert_eq!(feed.opened_channels(), 4);
        // 1s + 2s + 4s（ジッターは最大 10%）
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(7000));
        assert!(elapsed <= Duration::from_millis(7700));
        let resources = manager.resources().await;
        assert!(!resources.has_channel);
        assert!(!resources.retry_pending);
        assert!(!resources.handshake_pending);
        assert_eq!(feed.live_channels(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_in_error_state_requires_reconnect() {
        // テスト項目: error 状態では connect しても再試行しない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Reject(SubscribeStatus::TimedOut));
        let manager = manager(&feed, config(0));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Error).await;

        // when (操作):
        feed.set_handshake_mode(HandshakeMode::Accept);
        manager.connect().await;

        // then (期待する結果):
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(feed.opened_channels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_recovers_from_error() {
        // テスト項目: reconnect で再試行回数がリセットされ、接続し直せる
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Reject(SubscribeStatus::ChannelError));
        let manager = manager(&feed, config(2));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Error).await;

        // when (操作):
        feed.set_handshake_mode(HandshakeMode::Accept);
        manager.reconnect().await;
        let state = wait_status(&manager, ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_drop_is_recovered_automatically() {
        // テスト項目: 接続中の切断は自動で再接続され、成功すると再試行回数が 0 に戻る
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;

        // when (操作):
        feed.emit_status(TOPIC, SubscribeStatus::ChannelError);
        let reconnecting = wait_status(&manager, ConnectionStatus::Reconnecting).await;
        let recovered = wait_status(&manager, ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(reconnecting.retry_count, 1);
        assert!(
            reconnecting
                .error
                .unwrap()
                .starts_with("Connection lost, retrying in 1s")
        );
        assert_eq!(recovered.retry_count, 0);
        assert_eq!(feed.opened_channels(), 2);
        assert_eq!(feed.live_channels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_releases_channel_and_listeners() {
        // テスト項目: 切断後はチャンネル、リスナー、タイマーがすべて残らない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));
        manager.bind("live_chat_messages", EventFilter::Insert, Arc::new(|_| {}));
        manager.bind("live_chat_messages", EventFilter::Delete, Arc::new(|_| {}));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;
        assert_eq!(feed.listener_count(TOPIC), 2);

        // when (操作):
        manager.disconnect().await;

        // then (期待する結果):
        let state = manager.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.retry_count, 0);
        assert_eq!(feed.live_channels(), 0);
        assert_eq!(feed.listener_count(TOPIC), 0);
        let resources = manager.resources().await;
        assert!(!resources.has_channel);
        assert!(!resources.retry_pending);
        assert!(!resources.handshake_pending);
        assert_eq!(resources.bindings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        // テスト項目: 再試行待ちの間に切断すると、タイマーが取り消され再接続されない
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Reject(SubscribeStatus::ChannelError));
        let manager = manager(&feed, config(5));
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Reconnecting).await;

        // when (操作):
        manager.disconnect().await;
        feed.set_handshake_mode(HandshakeMode::Accept);
        tokio::time::sleep(Duration::from_secs(60)).await;

        // then (期待する結果):
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(feed.opened_channels(), 1);
        assert!(!manager.resources().await.retry_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_handshake_is_failed_by_watchdog() {
        // テスト項目: ハンドシェイクの応答がないと監視タイマーで失敗扱いになる
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        feed.set_handshake_mode(HandshakeMode::Silent);
        let manager = manager(
            &feed,
            config(5).with_handshake_timeout(Some(Duration::from_secs(10))),
        );
        let started = Instant::now();

        // when (操作):
        manager.connect().await;
        assert!(manager.resources().await.handshake_pending);
        let state = wait_status(&manager, ConnectionStatus::Reconnecting).await;

        // then (期待する結果):
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(state.retry_count, 1);
        assert_eq!(feed.live_channels(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bindings_receive_events_after_reconnect() {
        // テスト項目: 登録したリスナーは再接続後の新しいチャンネルでもイベントを受け取る
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        manager.bind(
            "live_chat_messages",
            EventFilter::Insert,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;

        // when (操作):
        manager.reconnect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;
        feed.publish(ChangeEvent::insert("live_chat_messages", json!({"id": "m1"})));

        // then (期待する結果):
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(feed.listener_count(TOPIC), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_releases_channel() {
        // テスト項目: 最後のハンドルを破棄するとチャンネルが解放される
        // given (前提条件):
        let feed = InMemoryChangeFeed::new();
        let manager = manager(&feed, config(5));
        let observer = manager.subscribe();
        manager.connect().await;
        wait_status(&manager, ConnectionStatus::Connected).await;

        // when (操作):
        drop(manager);
        for _ in 0..10 {
            if feed.live_channels() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // then (期待する結果):
        assert_eq!(feed.live_channels(), 0);
        assert_eq!(observer.borrow().status, ConnectionStatus::Disconnected);
    }
}
