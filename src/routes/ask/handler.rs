use std::convert::Infallible;
use std::pin::pin;

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};

use super::model::{AskQuery, AskResponse, QueryRequest};
use crate::{AppState, error::AppError};

// 先校验请求再计数，格式错误的请求不消耗当日额度
fn validate(
    query: Result<Query<AskQuery>, QueryRejection>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<(AskQuery, QueryRequest), AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let Json(payload) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    Ok((query, payload))
}

/// POST /ask?db_name=pharmacy  body: {"question": "Show top 5 medicines by revenue"}
#[axum::debug_handler]
pub async fn ask_sql_agent(
    State(state): State<AppState>,
    query: Result<Query<AskQuery>, QueryRejection>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let (query, payload) = validate(query, payload)?;

    state.usage.check_limit().await?;
    let agent = state.agents.create_agent(&query.db_name)?;

    let final_answer = {
        let mut steps = pin!(agent.stream(&payload.question));
        let mut final_answer = None;
        while let Some(step) = steps.next().await {
            final_answer = Some(step?.content);
        }
        final_answer
    };

    Ok(Json(AskResponse {
        database: query.db_name,
        question: payload.question,
        answer: final_answer,
    }))
}

/// 与 /ask 相同，但以 SSE 逐步推送代理的每个 step
pub async fn ask_sql_agent_stream(
    State(state): State<AppState>,
    query: Result<Query<AskQuery>, QueryRejection>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, AppError> {
    let (query, payload) = validate(query, payload)?;

    state.usage.check_limit().await?;
    let agent = state.agents.create_agent(&query.db_name)?;
    let question = payload.question;

    let events = async_stream::stream! {
        let mut steps = pin!(agent.stream(&question));
        let mut failed = false;
        while let Some(step) = steps.next().await {
            let event = match step {
                Ok(step) => Event::default().event("step").json_data(&step),
                Err(e) => {
                    tracing::error!("agent run failed: {}", e);
                    failed = true;
                    Ok(Event::default().event("error").data(e.to_string()))
                }
            };
            match event {
                Ok(event) => {
                    yield Ok::<_, Infallible>(event);
                }
                Err(e) => tracing::error!("failed to encode agent step: {}", e),
            }
            if failed {
                break;
            }
        }
        if !failed {
            yield Ok(Event::default().event("done").data("[DONE]"));
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
