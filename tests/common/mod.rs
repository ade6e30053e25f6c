//! 集成测试共用的假引擎与组装函数
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use theology_search::infrastructure::{AnswerCache, RateLimiter};
use theology_search::orchestrator::{RequestScheduler, SchedulerConfig, SearchOrchestrator};
use theology_search::services::{AnnotationProcessor, DocumentNamer, QaEngine};
use theology_search::{AppError, AppResult, CitationMarker, RawAnswer};

/// 记录调用次数的假引擎；`gated` 版本每次回答需要一个许可
pub struct CountingEngine {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    reply: RawAnswer,
    fail: bool,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Self::build(None, default_reply(), false)
    }

    pub fn with_reply(reply: RawAnswer) -> Arc<Self> {
        Self::build(None, reply, false)
    }

    pub fn gated() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), default_reply(), false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(None, default_reply(), true)
    }

    fn build(gate: Option<Semaphore>, reply: RawAnswer, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate,
            reply,
            fail,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }
}

fn default_reply() -> RawAnswer {
    RawAnswer::new(
        "三位一體是指聖父、聖子、聖靈同為一神【4:0†source】。",
        vec![CitationMarker::new(
            "【4:0†source】",
            "file-trinity001",
            "聖父、聖子、聖靈同為一神",
        )],
    )
}

#[async_trait]
impl QaEngine for CountingEngine {
    async fn answer(&self, _question: &str) -> AppResult<RawAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            permit.forget();
        }
        if self.fail {
            return Err(AppError::engine_failure("failed", "run failed"));
        }
        Ok(self.reply.clone())
    }
}

/// 返回 `<id>.pdf` 的名称解析
pub struct StaticNamer;

#[async_trait]
impl DocumentNamer for StaticNamer {
    async fn display_name(&self, document_id: &str) -> AppResult<String> {
        Ok(format!("{}.pdf", document_id))
    }
}

/// 按默认参数组装编排器
pub fn build_orchestrator(engine: Arc<dyn QaEngine>, max_requests: u32) -> SearchOrchestrator {
    let scheduler = RequestScheduler::new(
        engine,
        SchedulerConfig {
            max_concurrent: 3,
            queue_timeout: Duration::from_secs(60),
            estimated_secs_per_request: 20,
        },
    );
    SearchOrchestrator::new(
        Arc::new(AnswerCache::new(Duration::from_secs(1800), 2000)),
        Arc::new(RateLimiter::new(Duration::from_secs(900), max_requests)),
        scheduler,
        AnnotationProcessor::new(Arc::new(StaticNamer)),
    )
}
