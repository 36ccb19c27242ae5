//! 接続状態と状態遷移
//!
//! 接続マネージャーが所有する `ConnectionState` の遷移を、副作用のない純粋な
//! 関数として実装します。タイマーやチャンネルの操作は UseCase 層が担当します。

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backoff::RetryPolicy;

/// 接続ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// ハンドシェイクの結果待ち、または再試行待ちの状態か
    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ハンドシェイク失敗時の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// `delay` 後に再試行する
    Retry { delay: Duration },
    /// 再試行回数の上限に達した
    Exhausted,
}

/// 接続状態
///
/// ## 不変条件
///
/// - `retry_count` は `connected` への遷移と手動の再接続要求で 0 に戻る
/// - `error` は `connecting` / `connected` への遷移で消える
/// - `error` が存在するのは `reconnecting` / `error` のときだけ
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub last_connected: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status.is_connecting()
    }

    /// 接続試行の開始
    ///
    /// 失敗が続いている間は `reconnecting` のまま、直前の再試行メッセージを残す。
    pub fn begin_attempt(&mut self) {
        if self.retry_count > 0 {
            self.status = ConnectionStatus::Reconnecting;
        } else {
            self.status = ConnectionStatus::Connecting;
            self.error = None;
        }
    }

    /// ハンドシェイク成功
    pub fn mark_connected(&mut self, now: DateTime<Utc>) {
        self.status = ConnectionStatus::Connected;
        self.error = None;
        self.retry_count = 0;
        self.last_connected = Some(now);
    }

    /// ハンドシェイク失敗（エラー、タイムアウト、切断を区別しない）
    ///
    /// `jitter_sample` は `[0, 1]` の乱数。待ち時間は失敗前の `retry_count` で計算する。
    pub fn mark_failed(&mut self, policy: &RetryPolicy, jitter_sample: f64) -> FailureOutcome {
        if should_retry(self.retry_count, policy.max_retries) {
            let delay = policy.delay(self.retry_count, jitter_sample);
            self.retry_count += 1;
            self.status = ConnectionStatus::Reconnecting;
            self.error = Some(retry_message(delay));
            FailureOutcome::Retry { delay }
        } else {
            self.status = ConnectionStatus::Error;
            self.error = Some(format!(
                "Max retries exceeded ({}). Reconnect manually to try again.",
                policy.max_retries
            ));
            FailureOutcome::Exhausted
        }
    }

    /// 明示的な切断、またはティアダウン
    pub fn mark_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.error = None;
        self.retry_count = 0;
    }

    /// 手動の再接続要求
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }
}

/// 再試行すべきかを判定
///
/// # Returns
///
/// `retry_count` が上限未満なら `true`
pub fn should_retry(retry_count: u32, max_retries: u32) -> bool {
    retry_count < max_retries
}

fn retry_message(delay: Duration) -> String {
    let seconds = (delay.as_millis() as f64 / 1000.0).round() as u64;
    format!("Connection lost, retrying in {}s...", seconds)
}
