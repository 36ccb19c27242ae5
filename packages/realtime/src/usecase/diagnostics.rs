//! UseCase: 配信まわりの接続診断
//!
//! 管理者向けのトラブルシューティング。ストアへの到達性、配信設定、
//! メッセージテーブル、リアルタイムのハンドシェイクを順に確認する。

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::{
    CHAT_MESSAGES_TABLE, ChangeFeed, Query, RecordStore, STREAM_SETTINGS_TABLE, StoreError,
    StreamSettings, SubscribeStatus, decode_record,
};

/// ハンドシェイク確認に使うトピック
pub const DIAGNOSTIC_TOPIC: &str = "diagnostic_test";

/// ハンドシェイクの待ち時間
pub const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStatus {
    Success,
    Warning,
    Error,
}

impl DiagnosticStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "OK",
            Self::Warning => "Advertencia",
            Self::Error => "Error",
        }
    }
}

/// 1 項目の診断結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticResult {
    pub name: String,
    pub status: DiagnosticStatus,
    pub message: String,
    pub details: Option<String>,
}

impl DiagnosticResult {
    fn new(name: &str, status: DiagnosticStatus, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            details,
        }
    }
}

/// 接続診断
pub struct LiveDiagnostics {
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn ChangeFeed>,
    realtime_timeout: Duration,
}

impl LiveDiagnostics {
    pub fn new(store: Arc<dyn RecordStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            store,
            feed,
            realtime_timeout: DIAGNOSTIC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.realtime_timeout = timeout;
        self
    }

    /// すべての項目を順に確認する（途中で失敗しても最後まで実行する）
    pub async fn run(&self) -> Vec<DiagnosticResult> {
        let results = vec![
            self.check_store().await,
            self.check_stream_settings().await,
            self.check_message_table().await,
            self.check_realtime().await,
        ];

        let failures = results
            .iter()
            .filter(|r| r.status == DiagnosticStatus::Error)
            .count();
        tracing::info!("Diagnostics finished: {} check(s) failed", failures);
        results
    }

    async fn check_store(&self) -> DiagnosticResult {
        const NAME: &str = "Conexión al almacén";
        let query = Query::ordered_by("id", true).limit(1);
        match self.store.fetch_many(STREAM_SETTINGS_TABLE, query).await {
            Ok(_) => DiagnosticResult::new(NAME, DiagnosticStatus::Success, "Conexión exitosa", None),
            Err(e) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Error,
                "Error de conexión",
                Some(e.to_string()),
            ),
        }
    }

    async fn check_stream_settings(&self) -> DiagnosticResult {
        const NAME: &str = "Configuración del Stream";
        let result = match self.store.fetch_one(STREAM_SETTINGS_TABLE, None).await {
            Ok(record) => decode_record::<StreamSettings>(record),
            Err(e) => Err(e),
        };

        match result {
            Ok(settings) => {
                let message = format!(
                    "Estado: {}",
                    if settings.is_live { "Activo" } else { "Inactivo" }
                );
                let details = format!(
                    "Título: {}",
                    settings
                        .stream_title
                        .as_deref()
                        .filter(|title| !title.is_empty())
                        .unwrap_or("Sin título")
                );
                // 配信中なのに再生 URL がない
                let status = if settings.is_live && !settings.has_playback_url() {
                    DiagnosticStatus::Warning
                } else {
                    DiagnosticStatus::Success
                };
                DiagnosticResult::new(NAME, status, &message, Some(details))
            }
            Err(StoreError::NotFound(_)) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Warning,
                "No hay configuración del stream",
                None,
            ),
            Err(e) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Error,
                "No se pudo obtener la configuración",
                Some(e.to_string()),
            ),
        }
    }

    async fn check_message_table(&self) -> DiagnosticResult {
        const NAME: &str = "Tabla de Mensajes";
        let query = Query::ordered_by("created_at", false).limit(1);
        match self.store.fetch_many(CHAT_MESSAGES_TABLE, query).await {
            Ok(_) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Success,
                "Acceso exitoso",
                Some("Tabla accesible".to_string()),
            ),
            Err(e) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Error,
                "Error al acceder a mensajes",
                Some(e.to_string()),
            ),
        }
    }

    async fn check_realtime(&self) -> DiagnosticResult {
        const NAME: &str = "Conexión en Tiempo Real";
        let channel = match self.feed.open_channel(DIAGNOSTIC_TOPIC) {
            Ok(channel) => channel,
            Err(e) => {
                return DiagnosticResult::new(
                    NAME,
                    DiagnosticStatus::Error,
                    "Error al probar conexión en tiempo real",
                    Some(e.to_string()),
                );
            }
        };

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        channel.subscribe(Arc::new(move |status| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(status);
            }
        }));

        let outcome = tokio::time::timeout(self.realtime_timeout, rx).await;
        channel.unsubscribe();
        self.feed.release_channel(&channel);

        match outcome {
            Ok(Ok(SubscribeStatus::Subscribed)) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Success,
                "Conexión en tiempo real exitosa",
                Some(format!("Estado de suscripción: {}", SubscribeStatus::Subscribed)),
            ),
            Ok(Ok(status)) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Error,
                &format!("Estado: {}", status),
                Some(format!("Estado de suscripción: {}", status)),
            ),
            Ok(Err(_)) | Err(_) => DiagnosticResult::new(
                NAME,
                DiagnosticStatus::Error,
                "Timeout de conexión",
                Some(format!(
                    "La conexión tardó más de {} segundos",
                    self.realtime_timeout.as_secs()
                )),
            ),
        }
    }
}
