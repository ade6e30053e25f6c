use crate::api::{self, AppState};
use crate::clients::build_client;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{AnswerCache, RateLimiter};
use crate::orchestrator::{RequestScheduler, SchedulerConfig, SearchOrchestrator};
use crate::services::{AnnotationProcessor, AssistantEngine, DocumentNamer, FileNamer, QaEngine};
use crate::utils::logging::log_startup;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    state: AppState,
    sweepers: Vec<JoinHandle<()>>,
}

impl App {
    /// 初始化应用
    ///
    /// 校验配置并创建连接真实问答引擎的组件
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        log_startup(&config);

        let client = build_client(&config)?;
        let engine = Arc::new(AssistantEngine::new(client.clone(), &config));
        let namer = Arc::new(FileNamer::new(client, config.request_timeout()));

        Ok(Self::with_components(config, engine, namer))
    }

    /// 用给定的引擎和名称解析组装应用
    ///
    /// 必须在 tokio 运行时内调用（会启动后台清扫任务）
    pub fn with_components(
        config: Config,
        engine: Arc<dyn QaEngine>,
        namer: Arc<dyn DocumentNamer>,
    ) -> Self {
        let cache = Arc::new(AnswerCache::new(config.cache_ttl(), config.cache_capacity));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_window(),
            config.rate_max_requests,
        ));
        let sweepers = vec![
            cache.spawn_sweeper(config.cache_sweep_interval()),
            limiter.spawn_sweeper(config.rate_sweep_interval()),
        ];

        let scheduler = RequestScheduler::new(engine, SchedulerConfig::from_config(&config));
        let orchestrator = SearchOrchestrator::new(
            cache,
            limiter,
            scheduler,
            AnnotationProcessor::new(namer),
        );

        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            production: config.production,
            started_at: Instant::now(),
        };

        Self {
            config,
            state,
            sweepers,
        }
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// 监听配置的地址并提供服务，收到 Ctrl+C 后优雅退出
    pub async fn run(self) -> AppResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("✅ 服务已启动: http://{}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// 在已绑定的监听器上提供服务
    pub async fn serve(self, listener: TcpListener) -> AppResult<()> {
        let router = self.router();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        for sweeper in &self.sweepers {
            sweeper.abort();
        }
        info!("👋 服务已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在停止...");
}
