//! 问题快取 - 基础设施层
//!
//! 以规范化后的问题文本为键，保存已整理的回答。
//! 过期条目在查询时惰性淘汰，另有后台任务定期清扫。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::models::AnswerResult;
use crate::utils::logging::truncate_text;

/// 生成快取键：去除首尾空白、合并内部空白、转小写
pub fn cache_key(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 快取条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub result: AnswerResult,
    pub stored_at: Instant,
    /// 写入时的墙钟时间，返回给调用方
    pub stored_at_wall: DateTime<Utc>,
}

/// 快取命中结果
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub result: AnswerResult,
    pub cached_at: DateTime<Utc>,
}

/// 回答快取
///
/// 多个并发请求同时读写，由 `DashMap` 的分片锁保证同步；
/// 所有操作都是同步的，不会跨越 await 持有锁。
pub struct AnswerCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl AnswerCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// 查询快取，过期条目视为未命中并被移除
    pub fn lookup(&self, question: &str) -> Option<CachedAnswer> {
        let key = cache_key(question);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                info!("🎯 快取命中: {}", truncate_text(&key, 50));
                return Some(CachedAnswer {
                    result: entry.result.clone(),
                    cached_at: entry.stored_at_wall,
                });
            }
            Some(_) => {}
            None => return None,
        }

        // 读锁已释放，再按条件删除，避免误删刚写入的新条目
        let ttl = self.ttl;
        self.entries
            .remove_if(&key, |_, entry| now.duration_since(entry.stored_at) >= ttl);
        debug!("快取已过期: {}", truncate_text(&key, 50));
        None
    }

    /// 写入快取
    pub fn store(&self, question: &str, result: AnswerResult) {
        let key = cache_key(question);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.sweep();
            if self.entries.len() >= self.capacity {
                self.evict_oldest(&key);
            }
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                result,
                stored_at: Instant::now(),
                stored_at_wall: Utc::now(),
            },
        );

        // 并发写入不同的键时，上面的检查可能同时通过，写入后再收紧到上限
        while self.entries.len() > self.capacity {
            if !self.evict_oldest(&key) {
                break;
            }
        }

        debug!(
            "💾 快取已保存: {} (快取大小: {})",
            truncate_text(&key, 50),
            self.entries.len()
        );
    }

    /// 移除所有过期条目，返回移除数量
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// 清空快取，返回清除数量
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 启动后台清扫任务，快取被释放后自动退出
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    info!("🧹 清理过期快取 {} 条，剩余 {} 条", removed, cache.len());
                }
            }
        })
    }

    /// 淘汰最旧的条目（`keep` 除外），返回是否有条目被淘汰
    fn evict_oldest(&self, keep: &str) -> bool {
        let oldest = self
            .entries
            .iter()
            .filter(|entry| entry.key().as_str() != keep)
            .min_by_key(|entry| entry.stored_at)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                let removed = self.entries.remove(&key).is_some();
                debug!("快取已满，淘汰最旧条目: {}", truncate_text(&key, 50));
                removed
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question: &str) -> AnswerResult {
        AnswerResult::new(question, format!("{} 的答案", question), Vec::new())
    }

    #[test]
    fn test_cache_key_normalization() {
        assert_eq!(cache_key(" What Is X? "), cache_key("what is x?"));
        assert_eq!(cache_key("what   is\tX?"), "what is x?");
        // 幂等
        let once = cache_key("  Trinity  Doctrine ");
        assert_eq!(cache_key(&once), once);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_then_lookup_hit() {
        let cache = AnswerCache::new(Duration::from_secs(1800), 10);
        assert!(cache.lookup("什麼是三位一體？").is_none());

        cache.store("什麼是三位一體？", answer("什麼是三位一體？"));
        let hit = cache.lookup("  什麼是三位一體？ ").expect("应命中");
        assert_eq!(hit.result.question, "什麼是三位一體？");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_miss_and_evicted() {
        let cache = AnswerCache::new(Duration::from_secs(1800), 10);
        cache.store("q", answer("q"));

        tokio::time::advance(Duration::from_secs(1799)).await;
        assert!(cache.lookup("q").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.lookup("q").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = AnswerCache::new(Duration::from_secs(100), 10);
        cache.store("old", answer("old"));
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.store("new", answer("new"));
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.sweep(), 1);
        assert!(cache.lookup("new").is_some());
        assert!(cache.lookup("old").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = AnswerCache::new(Duration::from_secs(1000), 2);
        cache.store("a", answer("a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("b", answer("b"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("c", answer("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_existing_key_when_full_keeps_others() {
        let cache = AnswerCache::new(Duration::from_secs(1000), 2);
        cache.store("a", answer("a"));
        cache.store("b", answer("b"));
        cache.store("A", answer("a"));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("b").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stores_stay_within_capacity() {
        let cache = Arc::new(AnswerCache::new(Duration::from_secs(1000), 16));

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..200 {
                        let question = format!("問題 {}-{}", w, i);
                        cache.store(&question, answer(&question));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert!(cache.len() <= 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let cache = Arc::new(AnswerCache::new(Duration::from_secs(30), 10));
        cache.store("q", answer("q"));
        let handle = cache.spawn_sweeper(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty());
        handle.abort();
    }

    #[test]
    fn test_clear() {
        let cache = AnswerCache::new(Duration::from_secs(10), 10);
        cache.store("a", answer("a"));
        cache.store("b", answer("b"));
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
