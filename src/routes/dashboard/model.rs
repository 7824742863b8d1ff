use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::{FromRow, PgPool, postgres::PgRow};

use super::{DashboardError, QueryCache};

const TOTAL_REVENUE_SQL: &str = r#"
    SELECT coalesce(SUM(s.quantity * m.price_per_unit), 0)::float8 AS value
    FROM sales s JOIN medicines m ON s.medicine_id = m.medicine_id
"#;

const TOTAL_UNITS_SQL: &str = r#"
    SELECT coalesce(SUM(quantity), 0)::float8 AS value FROM sales
"#;

const ACTIVE_CUSTOMERS_SQL: &str = r#"
    SELECT COUNT(DISTINCT customer_id)::float8 AS value
    FROM sales
    WHERE sale_date > CURRENT_DATE - INTERVAL '180 days'
"#;

const QUARTERLY_REVENUE_SQL: &str = r#"
    SELECT DATE_TRUNC('quarter', sale_date)::date AS quarter,
           SUM(s.quantity * m.price_per_unit)::float8 AS revenue
    FROM sales s JOIN medicines m ON s.medicine_id = m.medicine_id
    GROUP BY 1 ORDER BY 1
"#;

const TOP_MEDICINES_SQL: &str = r#"
    SELECT m.name, SUM(s.quantity * m.price_per_unit)::float8 AS revenue
    FROM sales s JOIN medicines m ON s.medicine_id = m.medicine_id
    GROUP BY m.name ORDER BY revenue DESC LIMIT 10
"#;

const LOW_STOCK_SQL: &str = r#"
    SELECT m.name, i.stock_qty::int8 AS stock_qty, i.expiry_date
    FROM inventory i
    JOIN medicines m ON i.medicine_id = m.medicine_id
    WHERE i.stock_qty < 50
    ORDER BY i.stock_qty ASC
    LIMIT 10
"#;

const NEAR_EXPIRY_SQL: &str = r#"
    SELECT m.name, i.batch_no::text AS batch_no, i.expiry_date, i.stock_qty::int8 AS stock_qty
    FROM inventory i
    JOIN medicines m ON i.medicine_id = m.medicine_id
    WHERE i.expiry_date < CURRENT_DATE + INTERVAL '90 days'
    ORDER BY i.expiry_date
"#;

const TOP_CUSTOMERS_SQL: &str = r#"
    SELECT c.name, SUM(s.quantity * m.price_per_unit)::float8 AS spend
    FROM sales s
    JOIN customers c ON s.customer_id = c.customer_id
    JOIN medicines m ON s.medicine_id = m.medicine_id
    GROUP BY c.name ORDER BY spend DESC LIMIT 5
"#;

/// 执行一条固定查询，结果按 SQL 文本缓存
async fn run_query<T>(pool: &PgPool, cache: &QueryCache, sql: &str) -> Result<Vec<T>, DashboardError>
where
    T: for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Send + Unpin,
{
    cache
        .get_or_fetch(sql, || sqlx::query_as::<_, T>(sql).fetch_all(pool))
        .await
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
struct KpiValue {
    value: f64,
}

async fn kpi(pool: &PgPool, cache: &QueryCache, sql: &str) -> Result<f64, DashboardError> {
    let rows: Vec<KpiValue> = run_query(pool, cache, sql).await?;
    Ok(rows.first().map(|row| row.value).unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_revenue: f64,
    pub total_units: i64,
    pub active_customers: i64,
}

impl Kpis {
    pub async fn load(pool: &PgPool, cache: &QueryCache) -> Result<Self, DashboardError> {
        Ok(Kpis {
            total_revenue: kpi(pool, cache, TOTAL_REVENUE_SQL).await?,
            total_units: kpi(pool, cache, TOTAL_UNITS_SQL).await? as i64,
            active_customers: kpi(pool, cache, ACTIVE_CUSTOMERS_SQL).await? as i64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QuarterRevenue {
    pub quarter: NaiveDate,
    pub revenue: f64,
    #[sqlx(skip)]
    #[serde(default)]
    pub quarter_label: String,
}

/// 形如 "Q3 2024" 的季度标签
pub fn quarter_label(date: NaiveDate) -> String {
    format!("Q{} {}", (date.month() - 1) / 3 + 1, date.year())
}

impl QuarterRevenue {
    pub async fn load(pool: &PgPool, cache: &QueryCache) -> Result<Vec<Self>, DashboardError> {
        let mut rows: Vec<Self> = run_query(pool, cache, QUARTERLY_REVENUE_SQL).await?;
        label_quarters(&mut rows);
        Ok(rows)
    }
}

pub fn label_quarters(rows: &mut [QuarterRevenue]) {
    for row in rows {
        row.quarter_label = quarter_label(row.quarter);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MedicineRevenue {
    pub name: String,
    pub revenue: f64,
}

impl MedicineRevenue {
    pub async fn top(pool: &PgPool, cache: &QueryCache) -> Result<Vec<Self>, DashboardError> {
        run_query(pool, cache, TOP_MEDICINES_SQL).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LowStockItem {
    pub name: String,
    pub stock_qty: i64,
    pub expiry_date: Option<NaiveDate>,
}

impl LowStockItem {
    pub async fn load(pool: &PgPool, cache: &QueryCache) -> Result<Vec<Self>, DashboardError> {
        run_query(pool, cache, LOW_STOCK_SQL).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NearExpiryItem {
    pub name: String,
    pub batch_no: Option<String>,
    pub expiry_date: NaiveDate,
    pub stock_qty: i64,
}

impl NearExpiryItem {
    pub async fn load(pool: &PgPool, cache: &QueryCache) -> Result<Vec<Self>, DashboardError> {
        run_query(pool, cache, NEAR_EXPIRY_SQL).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CustomerSpend {
    pub name: String,
    pub spend: f64,
}

impl CustomerSpend {
    pub async fn top(pool: &PgPool, cache: &QueryCache) -> Result<Vec<Self>, DashboardError> {
        run_query(pool, cache, TOP_CUSTOMERS_SQL).await
    }
}
