use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row};

// 查询结果过长时截断，避免撑爆模型上下文
const MAX_RESULT_CHARS: usize = 8_000;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("table_names {0:?} not found in database")]
    UnknownTables(Vec<String>),
}

/// 代理可见的数据库能力：列表、结构、只读查询
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    fn dialect(&self) -> &str;

    async fn table_names(&self) -> Result<Vec<String>, DatabaseError>;

    /// 每张表的 CREATE TABLE 描述和若干样例行
    async fn table_info(&self, tables: &[String]) -> Result<String, DatabaseError>;

    /// 执行查询，结果以 JSON 数组文本返回；无结果时返回空串
    async fn run(&self, sql: &str) -> Result<String, DatabaseError>;
}

pub struct PgDatabase {
    pool: PgPool,
    sample_rows: u32,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sample_rows: 3,
        }
    }

    /// 延迟连接：首次查询时才真正建立连接
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'pharmacy_sql_agent';")
                        .await?;
                    Ok(())
                })
            })
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SqlDatabase for PgDatabase {
    fn dialect(&self) -> &str {
        "PostgreSQL"
    }

    async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn table_info(&self, tables: &[String]) -> Result<String, DatabaseError> {
        let known = self.table_names().await?;
        let missing: Vec<String> = tables
            .iter()
            .filter(|t| !known.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DatabaseError::UnknownTables(missing));
        }

        let mut sections = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = sqlx::query_as::<_, (String, String, bool)>(
                r#"
                SELECT column_name::text, data_type::text, (is_nullable = 'YES') AS nullable
                FROM information_schema.columns
                WHERE table_schema = 'public' AND table_name = $1
                ORDER BY ordinal_position
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

            let samples = sqlx::query_scalar::<_, String>(&format!(
                "SELECT row_to_json(t)::text FROM (SELECT * FROM {} LIMIT {}) t",
                quote_ident(table),
                self.sample_rows
            ))
            .fetch_all(&self.pool)
            .await?;

            sections.push(render_table_info(table, &columns, &samples));
        }

        Ok(sections.join("\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<String, DatabaseError> {
        // 只读事务，模型写出的 DML 会被数据库拒绝
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let rows = match wrap_query(sql) {
            Some(wrapped) => {
                sqlx::query_scalar::<_, String>(&wrapped)
                    .fetch_one(&mut *tx)
                    .await?
            }
            None => {
                // SHOW / EXPLAIN 等不能作为子查询，直接执行
                let rows = sqlx::query(strip_statement(sql))
                    .fetch_all(&mut *tx)
                    .await?;
                rows_to_json(&rows)
            }
        };
        tx.rollback().await?;

        if rows == "[]" {
            return Ok(String::new());
        }
        Ok(truncate(rows, MAX_RESULT_CHARS))
    }
}

fn strip_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// 把查询包成 `json_agg` 子查询；不能作为子查询的语句返回 None
pub(crate) fn wrap_query(sql: &str) -> Option<String> {
    let sql = strip_statement(sql);
    let keyword = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|word| !word.is_empty())?
        .to_ascii_lowercase();
    if !matches!(keyword.as_str(), "select" | "with" | "values" | "table") {
        return None;
    }
    // 换行后再闭合括号，结尾的 `--` 注释不会吞掉它
    Some(format!(
        "SELECT coalesce(json_agg(q), '[]'::json)::text FROM (\n{}\n) q",
        sql
    ))
}

/// 逐列尽量按文本、整数、浮点、布尔解码
fn rows_to_json(rows: &[PgRow]) -> String {
    let rows: Vec<Value> = rows
        .iter()
        .map(|row| {
            let object = row
                .columns()
                .iter()
                .map(|column| {
                    let i = column.ordinal();
                    let value = row
                        .try_get::<Option<String>, _>(i)
                        .map(Value::from)
                        .or_else(|_| row.try_get::<Option<i64>, _>(i).map(Value::from))
                        .or_else(|_| row.try_get::<Option<i32>, _>(i).map(Value::from))
                        .or_else(|_| row.try_get::<Option<f64>, _>(i).map(Value::from))
                        .or_else(|_| row.try_get::<Option<bool>, _>(i).map(Value::from))
                        .unwrap_or(Value::Null);
                    (column.name().to_string(), value)
                })
                .collect::<serde_json::Map<_, _>>();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows).to_string()
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn render_table_info(
    table: &str,
    columns: &[(String, String, bool)],
    samples: &[String],
) -> String {
    let column_lines = columns
        .iter()
        .map(|(name, data_type, nullable)| {
            if *nullable {
                format!("\t{} {}", name, data_type)
            } else {
                format!("\t{} {} NOT NULL", name, data_type)
            }
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE {} (\n{}\n)\n\n/*\n{} rows from {} table:\n{}\n*/",
        table,
        column_lines,
        samples.len(),
        table,
        samples.join("\n")
    )
}

fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
        text.push_str("... (truncated)");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn table_info_looks_like_ddl_with_samples() {
        let columns = vec![
            ("medicine_id".to_string(), "integer".to_string(), false),
            ("name".to_string(), "text".to_string(), true),
        ];
        let samples = vec![r#"{"medicine_id":1,"name":"Paracetamol"}"#.to_string()];
        let info = render_table_info("medicines", &columns, &samples);

        assert!(info.starts_with("CREATE TABLE medicines (\n\tmedicine_id integer NOT NULL,\n\tname text\n)"));
        assert!(info.contains("1 rows from medicines table:"));
        assert!(info.contains("Paracetamol"));
    }

    #[test]
    fn wrapped_queries_survive_trailing_comments_and_semicolons() {
        let wrapped = wrap_query("SELECT name FROM medicines LIMIT 5 -- top 5").unwrap();
        assert!(wrapped.ends_with("LIMIT 5 -- top 5\n) q"));

        let wrapped = wrap_query("  select 1;; ").unwrap();
        assert!(wrapped.ends_with("(\nselect 1\n) q"));

        assert!(wrap_query("WITH t AS (SELECT 1) SELECT * FROM t").is_some());
        assert!(wrap_query("(SELECT 1) UNION (SELECT 2)").is_some());
    }

    #[test]
    fn statements_that_cannot_be_subqueries_run_as_is() {
        assert_eq!(wrap_query("SHOW server_version;"), None);
        assert_eq!(wrap_query("EXPLAIN SELECT * FROM sales"), None);
        assert_eq!(wrap_query("   "), None);
        assert_eq!(strip_statement(" SHOW search_path; "), "SHOW search_path");
    }

    #[test]
    fn long_results_are_truncated_on_char_boundaries() {
        let text = "₹".repeat(10);
        assert_eq!(truncate(text.clone(), 20), text);
        assert_eq!(truncate(text, 3), "₹₹₹... (truncated)");
    }
}
