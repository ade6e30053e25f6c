//! # Theology Search
//!
//! 神學知識庫問答服務：把问题转交外部问答引擎，
//! 并负责准入控制与回答整理
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有跨请求共享的状态，只暴露能力
//! - `AnswerCache` - 回答快取（TTL + 容量上限 + 后台清扫）
//! - `RateLimiter` - 按客户端的固定窗口限流
//!
//! ### ② 外部接口层（Clients）
//! - `clients/` - 按配置构造 `async-openai` 客户端
//! - `build_client` / `call_with_timeout` - 客户端构造与单次调用超时
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个回答
//! - `AssistantEngine` - 提问并轮询结果
//! - `FileNamer` - 文档ID → 显示名称
//! - `AnnotationProcessor` - 引用编号、来源列表、文本清理
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 并发上限与先进先出排队
//! - `orchestrator/search_orchestrator` - 限流 → 快取 → 调度 → 整理 → 回写
//!
//! ### ⑤ 接口层（API）
//! - `api/` - axum 路由，JSON 与 SSE 两种返回方式
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnswerResult, Citation, CitationMarker, RawAnswer};
pub use orchestrator::{RequestScheduler, SearchOrchestrator, SearchOutcome};
pub use services::{AnnotationProcessor, DocumentNamer, QaEngine};
