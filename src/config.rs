//! 程序配置
//!
//! 默认值 → TOML 配置文件（可选）→ 环境变量，后者覆盖前者。

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// 生产模式下错误响应不附带内部细节
    pub production: bool,

    // --- 快取 ---
    /// 快取有效期（秒）
    pub cache_ttl_secs: u64,
    /// 过期快取清理周期（秒）
    pub cache_sweep_secs: u64,
    /// 快取条目上限
    pub cache_capacity: usize,

    // --- 限流 ---
    /// 限流窗口长度（秒）
    pub rate_window_secs: u64,
    /// 每个窗口内允许的请求数
    pub rate_max_requests: u32,
    /// 闲置窗口清理周期（秒）
    pub rate_sweep_secs: u64,

    // --- 调度 ---
    /// 同时调用问答引擎的最大请求数
    pub max_concurrent: usize,
    /// 排队超时（秒）
    pub queue_timeout_secs: u64,
    /// 每个请求的预估耗时（秒），仅用于提示排队等待时间
    pub estimated_secs_per_request: u64,

    // --- 问答引擎 ---
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub assistant_id: String,
    /// 轮询运行状态的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 最大轮询次数，超过即视为查询超时
    pub max_poll_attempts: u32,
    /// 单个 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            production: false,
            cache_ttl_secs: 30 * 60,
            cache_sweep_secs: 10 * 60,
            cache_capacity: 2000,
            rate_window_secs: 15 * 60,
            rate_max_requests: 10,
            rate_sweep_secs: 5 * 60,
            max_concurrent: 3,
            queue_timeout_secs: 60,
            estimated_secs_per_request: 20,
            openai_api_key: String::new(),
            openai_api_base: "https://api.openai.com/v1".to_string(),
            assistant_id: String::new(),
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// 加载配置：读取 `APP_CONFIG`（默认 `config.toml`）后再叠加环境变量
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("无法读取配置文件 {}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(self) -> Self {
        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .or_else(|| std::env::var("PORT").ok().map(|port| format!("0.0.0.0:{}", port)))
            .unwrap_or(self.bind_addr);

        Self {
            bind_addr,
            production: std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(self.production),
            cache_ttl_secs: env_or("CACHE_TTL_SECS", self.cache_ttl_secs),
            cache_sweep_secs: env_or("CACHE_SWEEP_SECS", self.cache_sweep_secs),
            cache_capacity: env_or("CACHE_CAPACITY", self.cache_capacity),
            rate_window_secs: env_or("RATE_WINDOW_SECS", self.rate_window_secs),
            rate_max_requests: env_or("RATE_MAX_REQUESTS", self.rate_max_requests),
            rate_sweep_secs: env_or("RATE_SWEEP_SECS", self.rate_sweep_secs),
            max_concurrent: env_or("MAX_CONCURRENT", self.max_concurrent),
            queue_timeout_secs: env_or("QUEUE_TIMEOUT_SECS", self.queue_timeout_secs),
            estimated_secs_per_request: env_or("ESTIMATED_SECS_PER_REQUEST", self.estimated_secs_per_request),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(self.openai_api_key),
            openai_api_base: std::env::var("OPENAI_API_BASE").unwrap_or(self.openai_api_base),
            assistant_id: std::env::var("ASSISTANT_ID").unwrap_or(self.assistant_id),
            poll_interval_ms: env_or("POLL_INTERVAL_MS", self.poll_interval_ms),
            max_poll_attempts: env_or("MAX_POLL_ATTEMPTS", self.max_poll_attempts),
            request_timeout_secs: env_or("HTTP_TIMEOUT_SECS", self.request_timeout_secs),
        }
    }

    /// 检查配置是否可用于启动服务
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent == 0 {
            return Err(AppError::Config("MAX_CONCURRENT 必须大于 0".to_string()));
        }
        if self.rate_max_requests == 0 {
            return Err(AppError::Config("RATE_MAX_REQUESTS 必须大于 0".to_string()));
        }
        if self.cache_ttl_secs == 0 || self.rate_window_secs == 0 {
            return Err(AppError::Config("快取有效期和限流窗口必须大于 0".to_string()));
        }
        if self.openai_api_key.is_empty() {
            return Err(AppError::Config("未设置 OPENAI_API_KEY".to_string()));
        }
        if self.assistant_id.is_empty() {
            return Err(AppError::Config("未设置 ASSISTANT_ID".to_string()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs.max(1))
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn rate_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_sweep_secs.max(1))
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}
