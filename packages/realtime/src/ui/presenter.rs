//! 接続ステータスの表示
//!
//! `ConnectionState` から、ラベル・アイコン・色・アニメーション・詳細行・
//! 再試行ボタンの有無を決める純粋関数。

use chrono::{DateTime, FixedOffset, Local, Utc};

use crate::{
    domain::{ConnectionState, ConnectionStatus},
    usecase::Reconnect,
};

/// 再試行ボタンの文言
pub const RETRY_LABEL: &str = "Reintentar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Wifi,
    WifiOff,
    RotateCcw,
    AlertCircle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Green,
    Yellow,
    Gray,
    Red,
}

/// 表示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    pub status: ConnectionStatus,
    pub label: &'static str,
    pub icon: StatusIcon,
    pub tone: StatusTone,
    /// 接続中の波紋アニメーション
    pub pulse: bool,
    /// 再接続中の回転アニメーション
    pub spin: bool,
    /// 再試行ボタンを表示するか
    pub show_retry: bool,
    pub details: Vec<String>,
}

impl StatusIndicator {
    /// 再試行ボタンの押下（ボタンが表示されていない状態では何もしない）
    pub async fn press_retry(&self, target: &dyn Reconnect) -> bool {
        if !self.show_retry {
            return false;
        }
        tracing::info!("Retry pressed while {}", self.status);
        target.reconnect().await;
        true
    }
}

/// 接続ステータスのプレゼンター
#[derive(Debug, Clone, Copy)]
pub struct StatusPresenter {
    show_details: bool,
    offset: FixedOffset,
}

impl Default for StatusPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPresenter {
    /// ローカルタイムゾーンで詳細行も表示する
    pub fn new() -> Self {
        Self {
            show_details: true,
            offset: *Local::now().offset(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn show_details(mut self, show_details: bool) -> Self {
        self.show_details = show_details;
        self
    }

    pub fn present(&self, state: &ConnectionState, now: DateTime<Utc>) -> StatusIndicator {
        let status = state.status;
        let (label, icon, tone) = match status {
            ConnectionStatus::Connected => ("Conectado", StatusIcon::Wifi, StatusTone::Green),
            ConnectionStatus::Connecting => ("Conectando...", StatusIcon::Wifi, StatusTone::Yellow),
            ConnectionStatus::Reconnecting => {
                ("Reconectando...", StatusIcon::RotateCcw, StatusTone::Yellow)
            }
            ConnectionStatus::Disconnected => {
                ("Desconectado", StatusIcon::WifiOff, StatusTone::Gray)
            }
            ConnectionStatus::Error => {
                ("Error de conexión", StatusIcon::AlertCircle, StatusTone::Red)
            }
        };

        StatusIndicator {
            status,
            label,
            icon,
            tone,
            pulse: status == ConnectionStatus::Connected,
            spin: status == ConnectionStatus::Reconnecting,
            show_retry: matches!(
                status,
                ConnectionStatus::Disconnected | ConnectionStatus::Error
            ),
            details: if self.show_details {
                self.details(state, now)
            } else {
                Vec::new()
            },
        }
    }

    fn details(&self, state: &ConnectionState, now: DateTime<Utc>) -> Vec<String> {
        let mut lines = Vec::new();

        if state.status == ConnectionStatus::Connected
            && let Some(last) = state.last_connected
        {
            lines.push(format!(
                "Conectado {}",
                format_last_connected(last, now, self.offset)
            ));
        }
        if matches!(
            state.status,
            ConnectionStatus::Reconnecting | ConnectionStatus::Error
        ) && let Some(error) = &state.error
        {
            lines.push(error.clone());
        }
        if state.status == ConnectionStatus::Reconnecting {
            lines.push("Reintentando conexión...".to_string());
        }
        lines
    }
}

/// 最終接続時刻の相対表示（1 時間以上前は `HH:MM`）
pub fn format_last_connected(
    last: DateTime<Utc>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let minutes = (now - last).num_minutes();
    match minutes {
        m if m < 1 => "hace un momento".to_string(),
        1 => "hace 1 minuto".to_string(),
        m if m < 60 => format!("hace {} minutos", m),
        _ => last.with_timezone(&offset).format("%H:%M").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, second).unwrap()
    }

    fn presenter() -> StatusPresenter {
        StatusPresenter::new().with_offset(FixedOffset::east_opt(2 * 3600).unwrap())
    }

    fn state(status: ConnectionStatus, error: Option<&str>) -> ConnectionState {
        ConnectionState {
            status,
            error: error.map(str::to_string),
            retry_count: 0,
            last_connected: Some(at(12, 0, 0)),
        }
    }

    #[test]
    fn test_labels_and_retry_control_per_status() {
        // テスト項目: ステータスごとのラベルと再試行ボタンの有無
        // given (前提条件):
        let cases = [
            (ConnectionStatus::Connected, "Conectado", false),
            (ConnectionStatus::Connecting, "Conectando...", false),
            (ConnectionStatus::Reconnecting, "Reconectando...", false),
            (ConnectionStatus::Disconnected, "Desconectado", true),
            (ConnectionStatus::Error, "Error de conexión", true),
        ];

        for (status, label, show_retry) in cases {
            // when (操作):
            let indicator = presenter().present(&state(status, None), at(12, 0, 0));

            // then (期待する結果):
            assert_eq!(indicator.label, label);
            assert_eq!(indicator.show_retry, show_retry, "{}", status);
        }
    }

    #[test]
    fn test_icons_tones_and_animation() {
        // テスト項目: アイコン・色・アニメーション
        // given (前提条件):
        let now = at(12, 0, 0);

        // when (操作):
        let connected = presenter().present(&state(ConnectionStatus::Connected, None), now);
        let reconnecting = presenter().present(&state(ConnectionStatus::Reconnecting, None), now);
        let error = presenter().present(&state(ConnectionStatus::Error, None), now);

        // then (期待する結果):
        assert_eq!((connected.icon, connected.tone), (StatusIcon::Wifi, StatusTone::Green));
        assert!(connected.pulse && !connected.spin);
        assert_eq!(
            (reconnecting.icon, reconnecting.tone),
            (StatusIcon::RotateCcw, StatusTone::Yellow)
        );
        assert!(reconnecting.spin && !reconnecting.pulse);
        assert_eq!((error.icon, error.tone), (StatusIcon::AlertCircle, StatusTone::Red));
    }

    #[test]
    fn test_details_for_reconnecting() {
        // テスト項目: 再接続中はエラー文と「Reintentando conexión...」を表示する
        // given (前提条件):
        let state = state(
            ConnectionStatus::Reconnecting,
            Some("Connection lost, retrying in 2s..."),
        );

        // when (操作):
        let indicator = presenter().present(&state, at(12, 5, 0));

        // then (期待する結果):
        assert_eq!(
            indicator.details,
            vec![
                "Connection lost, retrying in 2s...".to_string(),
                "Reintentando conexión...".to_string()
            ]
        );
    }

    #[test]
    fn test_details_hidden_when_disabled() {
        // テスト項目: 詳細表示をオフにすると詳細行を出さない
        // given (前提条件):
        let presenter = presenter().show_details(false);

        // when (操作):
        let indicator = presenter.present(&state(ConnectionStatus::Connected, None), at(12, 3, 0));

        // then (期待する結果):
        assert!(indicator.details.is_empty());
    }

    #[test]
    fn test_format_last_connected() {
        // テスト項目: 最終接続時刻の相対表示
        // given (前提条件):
        let last = at(12, 0, 0);
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();

        // when (操作) / then (期待する結果):
        assert_eq!(format_last_connected(last, at(12, 0, 59), offset), "hace un momento");
        assert_eq!(format_last_connected(last, at(12, 1, 0), offset), "hace 1 minuto");
        assert_eq!(format_last_connected(last, at(12, 59, 59), offset), "hace 59 minutos");
        assert_eq!(format_last_connected(last, at(13, 0, 0), offset), "14:00");
    }

    struct CountingReconnect(AtomicUsize);

    #[async_trait]
    impl Reconnect for CountingReconnect {
        async fn reconnect(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_retry_button_only_acts_when_shown() {
        // テスト項目: 再試行ボタンは表示されている状態でだけ reconnect を呼ぶ
        // given (前提条件):
        let target = CountingReconnect(AtomicUsize::new(0));
        let now = at(12, 0, 0);
        let connected = presenter().present(&state(ConnectionStatus::Connected, None), now);
        let error = presenter().present(&state(ConnectionStatus::Error, Some("x")), now);

        // when (操作):
        let ignored = connected.press_retry(&target).await;
        let pressed = error.press_retry(&target).await;

        // then (期待する結果):
        assert!(!ignored);
        assert!(pressed);
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }
}
