//! Incremental rendering of controller state.
//!
//! The controllers publish whole views; the console only prints what changed
//! since the previous view.

use std::collections::HashSet;

use carrera_realtime::{
    domain::ConnectionState,
    ui::StatusPresenter,
    usecase::{ChatView, SettingsView},
};
use chrono::{DateTime, FixedOffset, Utc};

use crate::formatter::ConsoleFormatter;

/// チャット一覧の差分表示
pub struct ChatRenderer {
    offset: FixedOffset,
    printed: HashSet<String>,
    last_unseen: usize,
    last_error: Option<String>,
}

impl ChatRenderer {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            printed: HashSet::new(),
            last_unseen: 0,
            last_error: None,
        }
    }

    /// 一覧の変化を反映する
    ///
    /// 末尾付近を見ている間は新着をそのまま出し、離れている間は件数だけ出す。
    pub fn on_view(&mut self, view: &ChatView, near_bottom: bool) -> Vec<String> {
        let mut lines = Vec::new();

        if view.error != self.last_error {
            if let Some(error) = &view.error {
                lines.push(format!("[Chat] error: {}", error));
            }
            self.last_error = view.error.clone();
        }

        if !self.printed.is_empty() && view.messages.is_empty() && !view.is_loading {
            lines.push("[Chat] El chat fue vaciado".to_string());
        }
        let current: HashSet<&str> = view.messages.iter().map(|m| m.id.as_str()).collect();
        self.printed.retain(|id| current.contains(id.as_str()));

        if near_bottom {
            lines.extend(self.flush(view));
        } else if view.new_message_count > 0 && view.new_message_count != self.last_unseen {
            lines.push(ConsoleFormatter::format_unseen(view.new_message_count));
        }
        self.last_unseen = view.new_message_count;

        lines
    }

    /// 末尾までスクロールする要求（未表示のメッセージをすべて出す）
    pub fn on_scroll_to_bottom(&mut self, view: &ChatView) -> Vec<String> {
        self.last_unseen = 0;
        self.flush(view)
    }

    fn flush(&mut self, view: &ChatView) -> Vec<String> {
        view.messages
            .iter()
            .filter(|message| self.printed.insert(message.id.clone()))
            .map(|message| ConsoleFormatter::format_chat_message(message, self.offset))
            .collect()
    }
}

/// 配信設定の差分表示
#[derive(Default)]
pub struct StreamRenderer {
    last: Option<String>,
}

impl StreamRenderer {
    pub fn on_view(&mut self, view: &SettingsView) -> Option<String> {
        if view.is_loading && view.settings.is_none() {
            return None;
        }
        let line = ConsoleFormatter::format_stream(view);
        if self.last.as_ref() == Some(&line) {
            return None;
        }
        self.last = Some(line.clone());
        Some(line)
    }
}

/// 接続ステータスの差分表示
pub struct StatusRenderer {
    channel: &'static str,
    presenter: StatusPresenter,
    last: Option<ConnectionState>,
}

impl StatusRenderer {
    pub fn new(channel: &'static str, presenter: StatusPresenter) -> Self {
        Self {
            channel,
            presenter,
            last: None,
        }
    }

    /// 状態が変わったときだけ表示する
    pub fn on_state(&mut self, state: &ConnectionState, now: DateTime<Utc>) -> Vec<String> {
        if self.last.as_ref() == Some(state) {
            return Vec::new();
        }
        self.last = Some(state.clone());
        self.render(state, now)
    }

    /// 現在の状態を常に表示する
    pub fn render(&self, state: &ConnectionState, now: DateTime<Utc>) -> Vec<String> {
        ConsoleFormatter::format_status(self.channel, &self.presenter.present(state, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrera_realtime::domain::{ChatMessage, ConnectionStatus};
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn message(id: &str, minute: u32) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            message: format!("msg {}", id),
            author: "Ana".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            updated_at: None,
        }
    }

    fn view(messages: Vec<ChatMessage>, new_message_count: usize) -> ChatView {
        ChatView {
            messages,
            is_loading: false,
            error: None,
            new_message_count,
        }
    }

    #[test]
    fn test_only_new_messages_are_printed() {
        // テスト項目: 前回表示したメッセージは再表示しない
        // given (前提条件):
        let mut renderer = ChatRenderer::new(offset());
        renderer.on_view(&view(vec![message("a", 0)], 0), true);

        // when (操作):
        let lines = renderer.on_view(&view(vec![message("a", 0), message("b", 1)], 0), true);

        // then (期待する結果):
        assert_eq!(lines, vec!["[10:01] @Ana: msg b".to_string()]);
    }

    #[test]
    fn test_away_from_bottom_shows_count_then_flushes() {
        // テスト項目: 末尾から離れている間は件数だけ表示し、末尾に戻ると溜まった分を表示する
        // given (前提条件):
        let mut renderer = ChatRenderer::new(offset());
        renderer.on_view(&view(vec![message("a", 0)], 0), true);
        let pending = view(vec![message("a", 0), message("b", 1), message("c", 2)], 2);

        // when (操作):
        let while_away = renderer.on_view(&pending, false);
        let unchanged = renderer.on_view(&pending, false);
        let on_return = renderer.on_scroll_to_bottom(&pending);

        // then (期待する結果):
        assert_eq!(while_away, vec!["↓ 2 mensajes nuevos (/bottom)".to_string()]);
        assert!(unchanged.is_empty());
        assert_eq!(on_return.len(), 2);
    }

    #[test]
    fn test_cleared_chat_is_announced() {
        // テスト項目: 一覧が空になったら通知する
        // given (前提条件):
        let mut renderer = ChatRenderer::new(offset());
        renderer.on_view(&view(vec![message("a", 0)], 0), true);

        // when (操作):
        let lines = renderer.on_view(&view(Vec::new(), 0), true);

        // then (期待する結果):
        assert_eq!(lines, vec!["[Chat] El chat fue vaciado".to_string()]);
    }

    #[test]
    fn test_stream_line_printed_once_per_change() {
        // テスト項目: 配信設定の表示は内容が変わったときだけ出る
        // given (前提条件):
        let mut renderer = StreamRenderer::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let offline = SettingsView {
            settings: Some(carrera_realtime::domain::StreamSettings::fallback(now)),
            ..SettingsView::default()
        };

        // when (操作):
        let first = renderer.on_view(&offline);
        let second = renderer.on_view(&offline);

        // then (期待する結果):
        assert_eq!(first.as_deref(), Some("[Stream] FUERA DE LÍNEA | Próxima Carrera"));
        assert_eq!(second, None);
    }

    #[test]
    fn test_status_printed_on_transition() {
        // テスト項目: 接続状態が変わったときだけ表示する
        // given (前提条件):
        let mut renderer = StatusRenderer::new("Chat", StatusPresenter::new().show_details(false));
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let connecting = ConnectionState {
            status: ConnectionStatus::Connecting,
            ..ConnectionState::default()
        };

        // when (操作):
        let first = renderer.on_state(&connecting, now);
        let repeated = renderer.on_state(&connecting, now);

        // then (期待する結果):
        assert_eq!(first, vec!["[Chat] ◐ Conectando...".to_string()]);
        assert!(repeated.is_empty());
    }
}
