//! 再接続のバックオフ計算
//!
//! `delay(n) = min(base × 2^n + jitter, 30s)`、jitter は `[0, 0.1 × base × 2^n]`
//! の一様乱数。インスタンスごとに独立に jitter を計算するため、複数の接続が同時に
//! 切断されても再試行のタイミングが揃わない。

use std::time::Duration;

use rand::Rng;

/// 再試行間隔の上限
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// jitter の最大比率（指数部分に対する割合）
const JITTER_RATIO: f64 = 0.1;

/// 再試行ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 自動再試行の最大回数
    pub max_retries: u32,
    /// 初回の待ち時間
    pub base_delay: Duration,
    /// 待ち時間の上限
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 上限 30 秒の再試行ポリシーを作成
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: MAX_RETRY_DELAY,
        }
    }

    /// `attempt` 回目の失敗後の待ち時間
    ///
    /// `jitter_sample` は `[0, 1]` の値で、jitter の幅にスケールされる。
    /// 範囲外の値は丸められる。
    pub fn delay(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponential_ms = base_ms * 2f64.powi(attempt.min(64) as i32);
        let jitter_ms = jitter_sample.clamp(0.0, 1.0) * JITTER_RATIO * exponential_ms;
        let max_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis((exponential_ms + jitter_ms).min(max_ms).floor() as u64)
    }

    /// `delay` に渡す jitter のサンプル（スレッドローカルな乱数、`[0, 1)`）
    pub fn sample_jitter() -> f64 {
        rand::thread_rng().r#gen()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1000))
    }
}
