//! UseCase: 配信設定の同期
//!
//! 単一行の配信設定を取得し、変更イベント（INSERT / UPDATE）を受け取るたびに
//! 丸ごと置き換えます。取得に失敗した場合は既知の値を残し、値がなければ
//! 代替設定を表示します。取得の再試行はしません。
//! 取得中に変更イベントが届いた場合、取得結果の方が古いので捨てます。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use carrera_shared::time::Clock;

use crate::{
    config::{ConnectionConfig, RealtimeConfig},
    domain::{
        ChangeEvent, ChangeFeed, ConnectionState, EventFilter, RecordStore,
        STREAM_SETTINGS_TABLE, StreamSettings, StreamStatus, decode_record,
    },
};

use super::connection_manager::{ConnectionManager, Reconnect};

/// 配信設定の同期オプション
#[derive(Debug, Clone)]
pub struct SettingsSyncOptions {
    /// `false` の場合は接続も取得もしない
    pub enabled: bool,
    /// 与えられた場合、起動時の取得を省略する
    pub initial_settings: Option<StreamSettings>,
    pub connection: ConnectionConfig,
}

impl SettingsSyncOptions {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            enabled: true,
            initial_settings: None,
            connection: config.stream_connection(),
        }
    }

    pub fn with_initial_settings(mut self, settings: StreamSettings) -> Self {
        self.initial_settings = Some(settings);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for SettingsSyncOptions {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

/// 表示用の配信設定
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingsView {
    pub settings: Option<StreamSettings>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// 最後に設定を受け取った時刻
    pub last_update: Option<DateTime<Utc>>,
}

impl SettingsView {
    pub fn stream_status(&self) -> StreamStatus {
        StreamStatus::derive(self.settings.as_ref())
    }
}

/// 配信設定の同期コントローラー
#[derive(Clone)]
pub struct SettingsSync {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    view: Arc<watch::Sender<SettingsView>>,
    /// 変更イベントを反映した回数
    revision: Arc<AtomicU64>,
    connection: ConnectionManager,
    enabled: bool,
    skip_initial_fetch: bool,
}

impl SettingsSync {
    pub fn new(
        options: SettingsSyncOptions,
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let skip_initial_fetch = options.initial_settings.is_some();
        let (view, _) = watch::channel(SettingsView {
            is_loading: !skip_initial_fetch,
            settings: options.initial_settings,
            error: None,
            last_update: None,
        });
        let view = Arc::new(view);
        let revision = Arc::new(AtomicU64::new(0));
        let connection = ConnectionManager::new(options.connection, feed, clock.clone());

        for event in [EventFilter::Update, EventFilter::Insert] {
            let view = view.clone();
            let revision = revision.clone();
            let clock = clock.clone();
            connection.bind(
                STREAM_SETTINGS_TABLE,
                event,
                Arc::new(move |change| apply_change(&view, &revision, clock.as_ref(), &change)),
            );
        }

        Self {
            store,
            clock,
            view,
            revision,
            connection,
            enabled: options.enabled,
            skip_initial_fetch,
        }
    }

    /// 同期を開始する（無効な場合は切断だけ行う）
    pub async fn activate(&self) {
        if !self.enabled {
            self.connection.disconnect().await;
            return;
        }

        self.connection.connect().await;
        if !self.skip_initial_fetch {
            self.refresh_settings().await;
        }
    }

    /// 同期を停止する
    pub async fn deactivate(&self) {
        self.connection.disconnect().await;
    }

    /// 設定を取得し直す
    pub async fn refresh_settings(&self) {
        self.view.send_modify(|view| {
            view.is_loading = true;
            view.error = None;
        });
        let revision = self.revision.load(Ordering::SeqCst);

        let result = match self.store.fetch_one(STREAM_SETTINGS_TABLE, None).await {
            Ok(record) => decode_record::<StreamSettings>(record),
            Err(e) => Err(e),
        };
        let now = self.clock.now();

        // 変更イベントの反映と同じロックの中で比較する
        self.view.send_modify(|view| {
            view.is_loading = false;
            if self.revision.load(Ordering::SeqCst) != revision {
                tracing::debug!("Discarding stream settings fetched before a newer change event");
                return;
            }
            match result {
                Ok(settings) => {
                    tracing::debug!("Fetched stream settings: live={}", settings.is_live);
                    view.settings = Some(settings);
                    view.last_update = Some(now);
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch stream settings: {}", e);
                    if view.settings.is_none() {
                        view.settings = Some(StreamSettings::fallback(now));
                    }
                    view.error = Some(e.to_string());
                }
            }
        });
    }

    pub fn view(&self) -> SettingsView {
        self.view.borrow().clone()
    }

    /// 表示の変化を監視する
    pub fn subscribe(&self) -> watch::Receiver<SettingsView> {
        self.view.subscribe()
    }

    pub fn settings(&self) -> Option<StreamSettings> {
        self.view.borrow().settings.clone()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.view.borrow().stream_status()
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
impl Reconnect for SettingsSync {
    async fn reconnect(&self) {
        SettingsSync::reconnect(self).await;
    }
}

/// 変更イベントで設定を丸ごと置き換える
fn apply_change(
    view: &watch::Sender<SettingsView>,
    revision: &AtomicU64,
    clock: &dyn Clock,
    change: &ChangeEvent,
) {
    match change.decode_new::<StreamSettings>() {
        Ok(settings) => {
            tracing::info!(
                "Stream settings {}: live={}, url={}",
                change.kind,
                settings.is_live,
                settings.playback_url.as_deref().unwrap_or("-")
            );
            let now = clock.now();
            view.send_modify(|view| {
                view.settings = Some(settings);
                view.last_update = Some(now);
                view.error = None;
                view.is_loading = false;
                revision.fetch_add(1, Ordering::SeqCst);
            });
        }
        Err(e) => {
            tracing::warn!("Ignoring malformed stream settings event: {}", e);
        }
    }
}
