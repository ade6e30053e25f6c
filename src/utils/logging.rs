/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// 默认级别为 `info`，可通过 `RUST_LOG` 覆盖。重复调用时静默忽略。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前生效的配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 神學知識庫問答服務啟動");
    info!("🌐 监听地址: {}", config.bind_addr);
    info!(
        "📊 最大并发: {} | 排队超时: {} 秒",
        config.max_concurrent, config.queue_timeout_secs
    );
    info!(
        "⛔ 限流: 每 {} 秒 {} 次",
        config.rate_window_secs, config.rate_max_requests
    );
    info!(
        "💾 快取: 有效期 {} 秒, 上限 {} 条",
        config.cache_ttl_secs, config.cache_capacity
    );
    if !config.production {
        info!("🔧 非生产模式：错误响应将包含内部细节");
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本
///
/// 按字符计数（不是字节），超出时追加 `...`
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
