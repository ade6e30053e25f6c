//! API 模块
//!
//! 负责对外暴露的 HTTP 接口

pub mod routes;

// 重新导出常用类型
pub use routes::{client_id, router, AppState};
