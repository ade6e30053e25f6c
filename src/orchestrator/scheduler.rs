//! 请求调度器 - 编排层
//!
//! ## 职责
//!
//! 限制同时发往问答引擎的请求数量，超出部分进入先进先出队列。
//!
//! ## 状态流转
//!
//! `提交 → {直接运行 | 排队} → 运行 → {完成 | 失败 | 排队超时}`
//!
//! 1. **直接运行**：在途数量未满且队列为空时立即调用引擎
//! 2. **排队**：追加到队尾，同时启动截止计时器
//! 3. **出队**：任一运行中的请求结束（成功或失败）时，取出队首补位，这是唯一的补位时机
//! 4. **超时**：截止时间到达仍在队中的请求被移出并以 `QueueTimeout` 结束，之后不会再被调度
//!
//! ## 同步
//!
//! 在途集合与队列放在同一把 `std::sync::Mutex` 里，只在同步代码段内加锁，
//! 不跨越 await。结果通过 `oneshot` 通道送达，每个请求最多送达一次。

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::RawAnswer;
use crate::services::QaEngine;
use crate::utils::logging::truncate_text;

type ResultSender = oneshot::Sender<AppResult<RawAnswer>>;

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub queue_timeout: Duration,
    /// 估算等待时间用的单个请求耗时
    pub estimated_secs_per_request: u64,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            queue_timeout: config.queue_timeout(),
            estimated_secs_per_request: config.estimated_secs_per_request,
        }
    }
}

/// 排队位置与预估等待时间（仅供参考）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// 从 1 开始
    pub position: usize,
    pub estimated_wait_secs: u64,
}

/// 提交时的准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Running,
    Queued(QueueStatus),
}

/// 调度器状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub queue_length: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
}

/// 排队中的请求
struct QueuedRequest {
    id: u64,
    question: String,
    submitted_at: Instant,
    deadline: Instant,
    result_tx: ResultSender,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct SchedulerState {
    in_flight: HashSet<u64>,
    queue: VecDeque<QueuedRequest>,
    next_id: u64,
}

struct Inner {
    engine: Arc<dyn QaEngine>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

/// 请求调度器
///
/// clone 后共享同一份状态
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<Inner>,
}

/// 提交凭证
///
/// 持有结果通道的接收端；丢弃凭证即放弃该请求，排队中的请求出队时会被跳过
pub struct Ticket {
    id: u64,
    admission: Admission,
    receiver: oneshot::Receiver<AppResult<RawAnswer>>,
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// 排队时返回位置信息，直接运行时返回 `None`
    pub fn queue_status(&self) -> Option<QueueStatus> {
        match self.admission {
            Admission::Queued(status) => Some(status),
            Admission::Running => None,
        }
    }

    /// 等待最终结果
    pub async fn wait(self) -> AppResult<RawAnswer> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(AppError::Internal("调度任务意外终止".to_string())))
    }
}

impl RequestScheduler {
    pub fn new(engine: Arc<dyn QaEngine>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                config,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// 提交一个问题
    ///
    /// 返回的凭证立即可用，通过 `Ticket::wait` 取得引擎结果。
    /// 不在 tokio 运行时内时不入队，凭证直接以内部错误结束。
    pub fn submit(&self, question: impl Into<String>) -> Ticket {
        let question = question.into();
        let (result_tx, receiver) = oneshot::channel();
        let max_concurrent = self.inner.config.max_concurrent;

        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;

        let Ok(runtime) = Handle::try_current() else {
            drop(state);
            warn!("运行时不可用，放弃请求 #{}", id);
            let _ = result_tx.send(Err(runtime_unavailable()));
            return Ticket {
                id,
                admission: Admission::Running,
                receiver,
            };
        };

        if state.in_flight.len() < max_concurrent && state.queue.is_empty() {
            state.in_flight.insert(id);
            let in_flight = state.in_flight.len();
            drop(state);

            debug!("请求 #{} 直接运行 ({}/{})", id, in_flight, max_concurrent);
            self.inner.start(id, question, result_tx);
            return Ticket {
                id,
                admission: Admission::Running,
                receiver,
            };
        }

        let submitted_at = Instant::now();
        let deadline = submitted_at + self.inner.config.queue_timeout;
        let position = state.queue.len() + 1;
        let status = QueueStatus {
            position,
            estimated_wait_secs: position as u64 * self.inner.config.estimated_secs_per_request,
        };

        info!(
            "⏳ 请求 #{} 进入队列，位置 {}，预计等待 {} 秒: {}",
            id,
            position,
            status.estimated_wait_secs,
            truncate_text(&question, 30)
        );

        let timer = runtime.spawn(expire_at(Arc::downgrade(&self.inner), id, deadline));
        state.queue.push_back(QueuedRequest {
            id,
            question,
            submitted_at,
            deadline,
            result_tx,
            timer: Some(timer.abort_handle()),
        });

        Ticket {
            id,
            admission: Admission::Queued(status),
            receiver,
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.inner.lock();
        SchedulerSnapshot {
            queue_length: state.queue.len(),
            in_flight: state.in_flight.len(),
            max_concurrent: self.inner.config.max_concurrent,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在新任务中调用引擎；任务结束时（包括 panic）释放在途名额
    fn start(self: &Arc<Self>, id: u64, question: String, result_tx: ResultSender) {
        let Ok(handle) = Handle::try_current() else {
            warn!("运行时不可用，放弃请求 #{}", id);
            let _ = result_tx.send(Err(runtime_unavailable()));
            self.lock().in_flight.remove(&id);
            return;
        };

        let inner = Arc::clone(self);
        handle.spawn(async move {
            let guard = InFlightGuard {
                inner: Arc::clone(&inner),
                id,
            };
            let result = inner.engine.answer(&question).await;
            if result_tx.send(result).is_err() {
                debug!("请求 #{} 的调用方已离开，结果丢弃", id);
            }
            drop(guard);
        });
    }

    /// 运行中的请求结束：移出在途集合，取队首补位
    fn complete(self: &Arc<Self>, id: u64) {
        let next = {
            let mut state = self.lock();
            state.in_flight.remove(&id);

            let mut next = None;
            while state.in_flight.len() < self.config.max_concurrent {
                let Some(request) = state.queue.pop_front() else {
                    break;
                };
                if let Some(timer) = &request.timer {
                    timer.abort();
                }
                if request.result_tx.is_closed() {
                    debug!("请求 #{} 已被调用方放弃，跳过", request.id);
                    continue;
                }
                state.in_flight.insert(request.id);
                next = Some(request);
                break;
            }
            next
        };

        if let Some(request) = next {
            debug!(
                "请求 #{} 出队运行，排队 {:?}",
                request.id,
                request.submitted_at.elapsed()
            );
            self.start(request.id, request.question, request.result_tx);
        }
    }
}

fn runtime_unavailable() -> AppError {
    AppError::Internal("运行时已关闭".to_string())
}

/// 释放在途名额
struct InFlightGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.complete(self.id);
    }
}

/// 截止计时：到期时若请求仍在队中，则移出并返回超时
async fn expire_at(inner: Weak<Inner>, id: u64, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let expired = {
        let mut state = inner.lock();
        let index = state.queue.iter().position(|r| r.id == id);
        index.and_then(|i| state.queue.remove(i))
    };

    if let Some(request) = expired {
        let waited_secs = request.deadline.duration_since(request.submitted_at).as_secs();
        warn!("⏰ 请求 #{} 排队 {} 秒未被处理，已超时", id, waited_secs);
        let _ = request
            .result_tx
            .send(Err(AppError::QueueTimeout { waited_secs }));
    }
}
