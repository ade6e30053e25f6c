//! 问答编排器 - 编排层
//!
//! ## 职责
//!
//! 每个问题的唯一入口，按固定顺序串联各组件：
//!
//! 1. **校验**：空问题直接拒绝，不消耗限流额度
//! 2. **限流**：按客户端计数，超限返回 `RateLimited`
//! 3. **快取**：命中则立即返回，并标记快取时间
//! 4. **调度**：提交给 `RequestScheduler`，排队时通过回调报告位置
//! 5. **整理**：引擎结果交给 `AnnotationProcessor`
//! 6. **回写**：只有成功的结果写入快取

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{AnswerCache, RateDecision, RateLimiter};
use crate::models::AnswerResult;
use crate::orchestrator::scheduler::{QueueStatus, RequestScheduler, SchedulerSnapshot};
use crate::services::AnnotationProcessor;
use crate::utils::logging::truncate_text;

/// 单次问答的结果
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: AnswerResult,
    /// 命中快取时为写入快取的时间
    pub cached_at: Option<DateTime<Utc>>,
}

impl SearchOutcome {
    pub fn is_cached(&self) -> bool {
        self.cached_at.is_some()
    }
}

/// 编排器运行状态
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorStatus {
    pub scheduler: SchedulerSnapshot,
    pub cache_size: usize,
    pub rate_windows: usize,
}

/// 问答编排器
pub struct SearchOrchestrator {
    cache: Arc<AnswerCache>,
    limiter: Arc<RateLimiter>,
    scheduler: RequestScheduler,
    annotator: AnnotationProcessor,
}

impl SearchOrchestrator {
    pub fn new(
        cache: Arc<AnswerCache>,
        limiter: Arc<RateLimiter>,
        scheduler: RequestScheduler,
        annotator: AnnotationProcessor,
    ) -> Self {
        Self {
            cache,
            limiter,
            scheduler,
            annotator,
        }
    }

    /// 处理一个问题
    ///
    /// # 参数
    /// - `question`: 用户问题
    /// - `client_id`: 限流用的客户端标识
    pub async fn handle(&self, question: &str, client_id: &str) -> AppResult<SearchOutcome> {
        self.handle_with_progress(question, client_id, |_| {}).await
    }

    /// 处理一个问题，排队时先调用一次 `on_queued`
    pub async fn handle_with_progress<F>(
        &self,
        question: &str,
        client_id: &str,
        on_queued: F,
    ) -> AppResult<SearchOutcome>
    where
        F: FnOnce(QueueStatus) + Send,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("問題不能為空".to_string()));
        }

        if let RateDecision::Rejected { retry_after_secs } = self.limiter.admit(client_id) {
            return Err(AppError::RateLimited { retry_after_secs });
        }

        if let Some(hit) = self.cache.lookup(question) {
            return Ok(SearchOutcome {
                result: hit.result,
                cached_at: Some(hit.cached_at),
            });
        }

        info!("🔍 处理问题: {}", truncate_text(question, 50));
        let ticket = self.scheduler.submit(question);
        if let Some(status) = ticket.queue_status() {
            on_queued(status);
        }

        let raw = match ticket.wait().await {
            Ok(raw) => raw,
            Err(e) => {
                error!("❌ 问题处理失败 ({}): {}", truncate_text(question, 30), e);
                return Err(e);
            }
        };

        let (answer_text, sources) = self.annotator.normalize(raw).await;
        let result = AnswerResult::new(question, answer_text, sources);
        self.cache.store(question, result.clone());

        info!(
            "✓ 回答完成: {} (来源 {} 个)",
            truncate_text(question, 30),
            result.sources.len()
        );
        Ok(SearchOutcome {
            result,
            cached_at: None,
        })
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            scheduler: self.scheduler.snapshot(),
            cache_size: self.cache.len(),
            rate_windows: self.limiter.len(),
        }
    }

    /// 清空快取，返回清除数量
    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        info!("🗑️ 快取已清空，共 {} 条", cleared);
        cleared
    }
}
