use async_openai::error::OpenAIError;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入不合法（空问题等），不会进入限流、快取和调度
    #[error("输入验证失败: {0}")]
    Validation(String),

    /// 超出限流窗口
    #[error("请求过于频繁，请在 {retry_after_secs} 秒后重试")]
    RateLimited { retry_after_secs: u64 },

    /// 排队期间到达截止时间
    #[error("排队超时 (已等待 {waited_secs} 秒)")]
    QueueTimeout { waited_secs: u64 },

    /// 问答引擎超过轮询上限仍未完成
    #[error("问答引擎查询超时 (已轮询 {attempts} 次)")]
    QueryTimeout { attempts: u32 },

    /// 问答引擎报告终止失败
    #[error("问答引擎执行失败 (状态: {status}): {message}")]
    EngineFailure { status: String, message: String },

    /// 外部协作服务无法访问
    #[error("外部服务不可用 ({service}): {source}")]
    UpstreamUnavailable {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 其他内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::RateLimited { .. } => 429,
            AppError::QueueTimeout { .. } | AppError::QueryTimeout { .. } => 504,
            AppError::EngineFailure { .. } => 502,
            AppError::UpstreamUnavailable { .. } => 503,
            AppError::Config(_) | AppError::Internal(_) => 500,
        }
    }

    /// 可以安全展示给调用方的错误信息
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::RateLimited { .. } => "請求過於頻繁，請稍後再試".to_string(),
            AppError::QueueTimeout { .. } | AppError::QueryTimeout { .. } => {
                "系統繁忙，處理時間過長，請稍後再試".to_string()
            }
            _ => "處理您的問題時發生錯誤，請稍後再試".to_string(),
        }
    }

    /// 限流时建议的重试间隔
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// 创建外部服务不可用错误
    pub fn upstream(
        service: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::UpstreamUnavailable {
            service: service.into(),
            source: Box::new(source),
        }
    }

    /// 创建问答引擎失败错误
    pub fn engine_failure(status: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::EngineFailure {
            status: status.into(),
            message: message.into(),
        }
    }
}

impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => AppError::upstream("openai", e),
            OpenAIError::ApiError(api) => {
                let status = api
                    .code
                    .clone()
                    .or_else(|| api.r#type.clone())
                    .unwrap_or_else(|| "api_error".to_string());
                AppError::engine_failure(status, api.message)
            }
            OpenAIError::JSONDeserialize(e, _) => {
                AppError::Internal(format!("问答引擎响应解析失败: {}", e))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("IO错误: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("TOML解析失败: {}", err))
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::RateLimited { retry_after_secs: 3 }.status_code(), 429);
        assert_eq!(AppError::QueueTimeout { waited_secs: 60 }.status_code(), 504);
        assert_eq!(AppError::QueryTimeout { attempts: 60 }.status_code(), 504);
        assert_eq!(AppError::engine_failure("failed", "boom").status_code(), 502);
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = AppError::engine_failure("failed", "vector store missing");
        assert!(!err.user_message().contains("vector store"));
        assert!(err.to_string().contains("vector store"));
    }

    #[test]
    fn test_openai_api_error_becomes_engine_failure() {
        let api = async_openai::error::ApiError {
            message: "No file found with id 'file-x'".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: None,
        };
        match AppError::from(OpenAIError::ApiError(api)) {
            AppError::EngineFailure { status, message } => {
                assert_eq!(status, "invalid_request_error");
                assert!(message.contains("file-x"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_openai_error_code_preferred_over_type() {
        let api = async_openai::error::ApiError {
            message: "slow down".to_string(),
            r#type: Some("requests".to_string()),
            param: None,
            code: Some("rate_limit_exceeded".to_string()),
        };
        let err = AppError::from(OpenAIError::ApiError(api));
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("rate_limit_exceeded"));
    }

    #[test]
    fn test_openai_client_side_error_is_internal() {
        let err = AppError::from(OpenAIError::InvalidArgument("missing assistant_id".into()));
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        assert_eq!(AppError::RateLimited { retry_after_secs: 42 }.retry_after(), Some(42));
        assert_eq!(AppError::QueueTimeout { waited_secs: 1 }.retry_after(), None);
    }
}
