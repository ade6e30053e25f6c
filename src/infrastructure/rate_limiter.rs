//! 按客户端限流 - 基础设施层
//!
//! 固定窗口计数：窗口到期后下一次请求重置计数。
//! 被拒绝的请求同样计数，不回退。

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// 单个客户端的计数窗口
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// 限流判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// 放行，附带本窗口剩余次数
    Allowed { remaining: u32 },
    /// 拒绝，附带建议重试秒数（向上取整，至少 1）
    Rejected { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// 记录一次请求并判断是否放行
    pub fn admit(&self, client_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert(RateWindow {
                count: 0,
                window_start: now,
            });

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 1;
            entry.window_start = now;
            debug!("客户端 {} 限流窗口已重置", client_id);
            return RateDecision::Allowed {
                remaining: self.max_requests.saturating_sub(1),
            };
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max_requests {
            let remaining = self.window - elapsed;
            let retry_after_secs = (remaining.as_millis().div_ceil(1000) as u64).max(1);
            warn!(
                "⛔ 客户端 {} 超出限流 ({} / {})，{} 秒后可重试",
                client_id, entry.count, self.max_requests, retry_after_secs
            );
            return RateDecision::Rejected { retry_after_secs };
        }

        RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    /// 清除窗口已结束的客户端，返回清除数量
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// 当前跟踪的客户端数量
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// 启动后台清扫任务，限流器被释放后自动退出
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    info!("🧹 清理闲置限流窗口 {} 个", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(WINDOW, 10);
        for i in 0..10 {
            assert!(limiter.admit("1.2.3.4").is_allowed(), "第 {} 次应放行", i + 1);
        }

        match limiter.admit("1.2.3.4") {
            RateDecision::Rejected { retry_after_secs } => assert_eq!(retry_after_secs, 900),
            other => panic!("第 11 次应被拒绝: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_shrinks_with_time() {
        let limiter = RateLimiter::new(WINDOW, 1);
        limiter.admit("c");
        tokio::time::advance(Duration::from_millis(100_500)).await;

        // 剩余 799.5 秒，向上取整
        assert_eq!(
            limiter.admit("c"),
            RateDecision::Rejected { retry_after_secs: 800 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_duration() {
        let limiter = RateLimiter::new(WINDOW, 10);
        for _ in 0..11 {
            limiter.admit("c");
        }
        tokio::time::advance(WINDOW).await;

        assert_eq!(limiter.admit("c"), RateDecision::Allowed { remaining: 9 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_attempts_still_count() {
        let limiter = RateLimiter::new(WINDOW, 2);
        limiter.admit("c");
        limiter.admit("c");
        for _ in 0..5 {
            assert!(!limiter.admit("c").is_allowed());
        }
        assert_eq!(limiter.windows.get("c").map(|w| w.count), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(WINDOW, 1);
        assert!(limiter.admit("a").is_allowed());
        assert!(!limiter.admit("a").is_allowed());
        assert!(limiter.admit("b").is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_stale_windows() {
        let limiter = RateLimiter::new(WINDOW, 10);
        limiter.admit("old");
        tokio::time::advance(Duration::from_secs(600)).await;
        limiter.admit("fresh");
        tokio::time::advance(Duration::from_secs(300)).await;

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_drops_stale_windows_and_exits() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(120), 10));
        limiter.admit("1.2.3.4");
        let handle = limiter.spawn_sweeper(Duration::from_secs(60));

        // 第一次清扫时窗口未结束
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(limiter.is_empty());

        // 限流器释放后任务自行结束
        drop(limiter);
        let finished = tokio::time::timeout(Duration::from_secs(120), handle).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
