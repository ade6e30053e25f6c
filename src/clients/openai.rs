/// Assistants 接口客户端
///
/// 只负责按配置构造 `async-openai` 客户端，不包含轮询和重试逻辑
use async_openai::config::{OpenAIConfig, OPENAI_BETA_HEADER};
use async_openai::error::OpenAIError;
use async_openai::Client;
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 创建 Assistants 客户端
///
/// `Client` 内部持有连接池，clone 代价很小
pub fn build_client(config: &Config) -> AppResult<Client<OpenAIConfig>> {
    // Assistants 接口需要 v2 beta 头
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(config.openai_api_base.trim_end_matches('/'))
        .with_header(OPENAI_BETA_HEADER, "assistants=v2")?;

    Ok(Client::with_config(openai_config))
}

/// 给单次接口调用加上超时
///
/// 超时按外部服务不可用处理
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = Result<T, OpenAIError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(elapsed) => Err(AppError::upstream("openai", elapsed)),
    }
}
