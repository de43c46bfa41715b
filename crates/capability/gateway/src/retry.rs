use std::time::Duration;

/// 远程调用重试策略。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 单次 `execute` 的最大尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    /// 单次尝试的超时
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(10_000),
            call_timeout: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次（从 1 开始）失败后的等待时长：
    /// `min(initial * multiplier^(attempt-1), max)`。
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial_ms = self.initial_backoff.as_millis() as f64;
        let max_ms = self.max_backoff.as_millis() as f64;
        let delay_ms = (initial_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// 完整退避序列（长度 `max_attempts - 1`，最后一次失败后不再等待）。
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .collect()
    }
}
