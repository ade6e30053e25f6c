//! 服务层（Service Layer）
//!
//! - `qa_engine` - 问答引擎抽象及 Assistants 实现
//! - `document_names` - 文档ID到显示名称的解析
//! - `annotation` - 引用标注整理
//! - `text_cleanup` - 回答文本清理流水线

pub mod annotation;
pub mod document_names;
pub mod qa_engine;
pub mod text_cleanup;

pub use annotation::{AnnotationProcessor, NO_ANSWER_FALLBACK};
pub use document_names::{DocumentNamer, FileNamer};
pub use qa_engine::{AssistantEngine, QaEngine};
