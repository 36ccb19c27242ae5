//! Formatting utilities for console display.

use carrera_realtime::{
    domain::{ChatMessage, StreamStatus},
    ui::{RETRY_LABEL, StatusIcon, StatusIndicator, StatusTone},
    usecase::{DiagnosticResult, DiagnosticStatus, SettingsView},
};
use chrono::FixedOffset;

const SEPARATOR: &str = "============================================================";

/// Formatter for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// 接続ステータスの 1 行（詳細行は続けて字下げする）
    ///
    /// # Arguments
    ///
    /// * `channel` - 表示名（`Stream` / `Chat`）
    /// * `indicator` - プレゼンターの出力
    pub fn format_status(channel: &str, indicator: &StatusIndicator) -> Vec<String> {
        let mut head = format!(
            "[{}] {} {}{}",
            channel,
            Self::icon(indicator.icon, indicator.tone),
            indicator.label,
            if indicator.spin { " ↻" } else { "" }
        );
        if indicator.show_retry {
            head.push_str(&format!("  ({}: /reconnect)", RETRY_LABEL));
        }

        let mut lines = vec![head];
        lines.extend(indicator.details.iter().map(|line| format!("    {}", line)));
        lines
    }

    fn icon(icon: StatusIcon, tone: StatusTone) -> &'static str {
        match (icon, tone) {
            (StatusIcon::Wifi, StatusTone::Green) => "●",
            (StatusIcon::Wifi, _) => "◐",
            (StatusIcon::RotateCcw, _) => "◌",
            (StatusIcon::WifiOff, _) => "○",
            (StatusIcon::AlertCircle, _) => "✖",
        }
    }

    /// 配信設定の 1 行
    pub fn format_stream(view: &SettingsView) -> String {
        let status = match view.stream_status() {
            StreamStatus::Loading => "CARGANDO",
            StreamStatus::Offline => "FUERA DE LÍNEA",
            StreamStatus::Preparing => "PREPARANDO",
            StreamStatus::Live => "EN VIVO",
        };

        let mut line = format!("[Stream] {}", status);
        if let Some(settings) = &view.settings {
            if let Some(title) = settings.stream_title.as_deref().filter(|t| !t.is_empty()) {
                line.push_str(&format!(" | {}", title));
            }
            if let Some(url) = settings.playback_url.as_deref().filter(|u| !u.is_empty()) {
                line.push_str(&format!(" | {}", url));
            }
        }
        if let Some(error) = &view.error {
            line.push_str(&format!(" | error: {}", error));
        }
        line
    }

    /// チャットメッセージ（時刻は `offset` のタイムゾーンで表示する）
    pub fn format_chat_message(message: &ChatMessage, offset: FixedOffset) -> String {
        format!(
            "[{}] @{}: {}",
            message.created_at.with_timezone(&offset).format("%H:%M"),
            message.author,
            message.message
        )
    }

    /// 末尾から離れている間の新着件数
    pub fn format_unseen(count: usize) -> String {
        match count {
            1 => "↓ 1 mensaje nuevo (/bottom)".to_string(),
            n => format!("↓ {} mensajes nuevos (/bottom)", n),
        }
    }

    /// 診断結果の一覧
    pub fn format_diagnostics(results: &[DiagnosticResult]) -> Vec<String> {
        let mut lines = vec![SEPARATOR.to_string(), "Diagnóstico de conexión".to_string()];
        for result in results {
            let mark = match result.status {
                DiagnosticStatus::Success => "✔",
                DiagnosticStatus::Warning => "!",
                DiagnosticStatus::Error => "✖",
            };
            lines.push(format!(
                "{} {} [{}]: {}",
                mark,
                result.name,
                result.status.label(),
                result.message
            ));
            if let Some(details) = &result.details {
                lines.push(format!("    {}", details));
            }
        }
        lines.push(SEPARATOR.to_string());
        lines
    }
}
