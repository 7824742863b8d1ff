use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::log_errors, routes};

// 问答接口
pub fn ask_routes() -> Router<AppState> {
    Router::new()
        .route("/ask", post(routes::ask::ask_sql_agent))
        .route("/ask/stream", post(routes::ask::ask_sql_agent_stream))
}

// 仪表盘数据
pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(routes::dashboard::get_dashboard))
}

// 创建主路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(ask_routes())
        .merge(dashboard_routes())
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
