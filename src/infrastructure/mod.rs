//! 基础设施层（Infrastructure Layer）
//!
//! 持有跨请求共享的可变状态，只暴露能力：
//! - `AnswerCache` - 回答快取（TTL + 容量上限）
//! - `RateLimiter` - 按客户端的固定窗口限流
//!
//! 两者各自由一个后台任务定期清扫，加锁时间只覆盖清扫本身。

pub mod cache;
pub mod rate_limiter;

pub use cache::{cache_key, AnswerCache, CacheEntry, CachedAnswer};
pub use rate_limiter::{RateDecision, RateLimiter, RateWindow};
