use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AskQuery {
    pub db_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub database: String,
    pub question: String,
    // 代理没有产出任何 step 时为 null
    pub answer: Option<String>,
}
