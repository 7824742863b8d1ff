use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use pharmacy_bi::{AppState, agent::SqlAgentFactory, config::Config, router::create_router};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().context("Failed to load configuration")?;

    if config.openai_api_key.is_none() {
        tracing::warn!("No OpenAI API key configured, /ask will fail until one is set");
    }

    // 仪表盘使用的连接池，首次查询时才连接
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'pharmacy_dashboard';")
                    .await?;
                Ok(())
            })
        })
        .connect_lazy(&config.default_database_url())
        .context("Invalid database configuration")?;

    let agents = Arc::new(SqlAgentFactory::new(config.clone()));
    let state = AppState::new(pool, config.clone(), agents);
    tracing::info!(
        path = %config.usage_log.display(),
        limit = config.daily_limit,
        "usage gate ready"
    );

    let router = create_router(state);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
