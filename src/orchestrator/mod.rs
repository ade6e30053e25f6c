//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责请求的准入与调度，是整个服务的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `search_orchestrator` - 问答编排器
//! - 每个问题的唯一入口
//! - 串联校验、限流、快取、调度、标注整理
//! - 只回写成功的结果
//!
//! ### `scheduler` - 请求调度器
//! - 限制在途请求数量（`max_concurrent`）
//! - 先进先出排队，带截止时间
//! - 运行结束时取队首补位
//!
//! ## 层次关系
//!
//! ```text
//! api (HTTP 路由)
//!     ↓
//! search_orchestrator (处理单个问题)
//!     ↓
//! scheduler (并发控制 + 排队)
//!     ↓
//! services (能力层：qa_engine / annotation / document_names)
//!     ↓
//! infrastructure (基础设施：AnswerCache / RateLimiter)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：编排器管流程，调度器管并发
//! 2. **向下依赖**：编排层 → services → clients / infrastructure
//! 3. **无业务逻辑**：不做文本处理，只做调度和回写

pub mod scheduler;
pub mod search_orchestrator;

// 重新导出主要类型
pub use scheduler::{
    Admission, QueueStatus, RequestScheduler, SchedulerConfig, SchedulerSnapshot, Ticket,
};
pub use search_orchestrator::{OrchestratorStatus, SearchOrchestrator, SearchOutcome};
