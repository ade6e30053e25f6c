//! HTTP 请求与响应结构
//!
//! 字段命名保持 camelCase，与前端约定一致

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::answer::{AnswerResult, Citation};

/// `POST /search` 请求体
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub question: String,
    /// 已认证用户标识或调用方自带的标识，缺省时使用网络地址
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDto {
    pub index: usize,
    pub file_name: String,
    pub quote: String,
    pub file_id: String,
}

impl From<&Citation> for SourceDto {
    fn from(citation: &Citation) -> Self {
        Self {
            index: citation.ordinal,
            file_name: citation.display_name.clone(),
            quote: citation.quote.clone(),
            file_id: citation.document_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceDto>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_time: Option<DateTime<Utc>>,
}

impl SearchData {
    pub fn from_result(result: &AnswerResult, cache_time: Option<DateTime<Utc>>) -> Self {
        Self {
            question: result.question.clone(),
            answer: result.answer_text.clone(),
            sources: result.sources.iter().map(SourceDto::from).collect(),
            timestamp: result.timestamp,
            cached: cache_time.map(|_| true),
            cache_time,
        }
    }
}

/// 成功响应
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub data: SearchData,
}

impl SuccessResponse {
    pub fn new(data: SearchData) -> Self {
        Self { success: true, data }
    }
}

/// 失败响应（含限流）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// 由错误构造响应；生产模式下不附带内部细节
    pub fn from_error(err: &AppError, production: bool) -> Self {
        Self {
            success: false,
            error: err.user_message(),
            retry_after: err.retry_after(),
            details: (!production).then(|| err.to_string()),
        }
    }
}

/// 排队提示（仅供参考，不保证）
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedNotice {
    pub queued: bool,
    pub position: usize,
    pub estimated_wait_time: u64,
}

/// `GET /status` 响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub queue_length: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub cache_size: usize,
    pub rate_windows: usize,
    pub uptime_seconds: u64,
}
