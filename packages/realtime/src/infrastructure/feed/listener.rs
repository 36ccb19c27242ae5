//! チャンネル共通のリスナー管理
//!
//! リスナーの登録・解除、ハンドシェイク状態の通知、イベントの配送を扱う。
//! コールバックはロックを外してから呼び出す（コールバック内からチャンネルを
//! 操作してもデッドロックしない）。

use parking_lot::Mutex;

use crate::domain::{ChangeCallback, ChangeEvent, EventFilter, StatusCallback, SubscribeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// 作成直後
    Idle,
    /// ハンドシェイク中
    Joining,
    Subscribed,
    /// 購読解除済み、または切断済み
    Closed,
}

struct Listener {
    table: String,
    event: EventFilter,
    callback: ChangeCallback,
}

struct CoreState {
    phase: Phase,
    listeners: Vec<Listener>,
    status_callback: Option<StatusCallback>,
}

pub(crate) struct ChannelCore {
    topic: String,
    state: Mutex<CoreState>,
}

impl ChannelCore {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            state: Mutex::new(CoreState {
                phase: Phase::Idle,
                listeners: Vec::new(),
                status_callback: None,
            }),
        }
    }

    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub(crate) fn add_listener(&self, table: &str, event: EventFilter, callback: ChangeCallback) {
        self.state.lock().listeners.push(Listener {
            table: table.to_string(),
            event,
            callback,
        });
    }

    pub(crate) fn remove_listeners(&self, table: &str, event: EventFilter) -> usize {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state
            .listeners
            .retain(|l| !(l.table == table && l.event == event));
        before - state.listeners.len()
    }

    /// ハンドシェイクを開始（コールバックを保持して Joining にする）
    pub(crate) fn begin_join(&self, callback: StatusCallback) {
        let mut state = self.state.lock();
        state.phase = Phase::Joining;
        state.status_callback = Some(callback);
    }

    /// ハンドシェイク状態を通知
    ///
    /// 購読解除済みのチャンネルには `CLOSED` 以外を通知しない。
    pub(crate) fn notify_status(&self, status: SubscribeStatus) {
        let callback = {
            let mut state = self.state.lock();
            if state.phase == Phase::Closed && status != SubscribeStatus::Closed {
                return;
            }
            if state.phase == Phase::Idle {
                return;
            }
            state.phase = match status {
                SubscribeStatus::Subscribed => Phase::Subscribed,
                _ => Phase::Closed,
            };
            state.status_callback.clone()
        };

        if let Some(callback) = callback {
            callback(status);
        }
    }

    /// 購読を解除し、ハンドシェイク済みだった場合は `CLOSED` を通知
    pub(crate) fn close(&self) -> bool {
        let (was_active, callback) = {
            let mut state = self.state.lock();
            let was_active = matches!(state.phase, Phase::Joining | Phase::Subscribed);
            state.phase = Phase::Closed;
            (was_active, state.status_callback.clone())
        };

        if was_active && let Some(callback) = callback {
            callback(SubscribeStatus::Closed);
        }
        was_active
    }

    /// 購読中であれば、テーブル・種別が一致するリスナーにイベントを配送
    pub(crate) fn dispatch(&self, event: &ChangeEvent) -> usize {
        let callbacks: Vec<ChangeCallback> = {
            let state = self.state.lock();
            if state.phase != Phase::Subscribed {
                return 0;
            }
            state
                .listeners
                .iter()
                .filter(|l| l.table == event.table && l.event.matches(event.kind))
                .map(|l| l.callback.clone())
                .collect()
        };

        for callback in &callbacks {
            callback(event.clone());
        }
        callbacks.len()
    }
}
