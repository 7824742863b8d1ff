mod handler;
mod model;

pub use handler::{ask_sql_agent, ask_sql_agent_stream};
pub use model::{AskQuery, AskResponse, QueryRequest};
