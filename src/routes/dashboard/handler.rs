use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::Value;

use super::charts;
use super::model::{CustomerSpend, Kpis, LowStockItem, MedicineRevenue, NearExpiryItem, QuarterRevenue};
use crate::{AppState, error::AppError};

/// 可直接交给 Plotly 渲染的图表
#[derive(Debug, Serialize)]
pub struct DashboardFigures {
    pub indicators: Vec<Value>,
    pub quarterly_sales: Value,
    pub top_medicines: Value,
    pub low_stock: Value,
    pub top_customers: Value,
}

/// 仪表盘全部面板：KPI 数值、图表和临期药品表
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub kpis: Kpis,
    pub figures: DashboardFigures,
    pub near_expiry: Vec<NearExpiryItem>,
}

impl DashboardView {
    pub fn build(
        kpis: Kpis,
        quarterly: &[QuarterRevenue],
        medicines: &[MedicineRevenue],
        low_stock: &[LowStockItem],
        customers: &[CustomerSpend],
        near_expiry: Vec<NearExpiryItem>,
    ) -> Self {
        let figures = DashboardFigures {
            indicators: charts::kpi_indicators(&kpis),
            quarterly_sales: charts::quarterly_sales(quarterly),
            top_medicines: charts::top_medicines(medicines),
            low_stock: charts::low_stock(low_stock),
            top_customers: charts::top_customers(customers),
        };
        DashboardView {
            kpis,
            figures,
            near_expiry,
        }
    }
}

#[axum::debug_handler]
pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardView>, AppError> {
    let pool = &state.pool;
    let cache = &state.dashboard_cache;

    let kpis = Kpis::load(pool, cache).await?;
    let quarterly = QuarterRevenue::load(pool, cache).await?;
    let medicines = MedicineRevenue::top(pool, cache).await?;
    let low_stock = LowStockItem::load(pool, cache).await?;
    let near_expiry = NearExpiryItem::load(pool, cache).await?;
    let customers = CustomerSpend::top(pool, cache).await?;

    Ok(Json(DashboardView::build(
        kpis,
        &quarterly,
        &medicines,
        &low_stock,
        &customers,
        near_expiry,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn view_groups_charts_under_figures() {
        let view = DashboardView::build(
            Kpis {
                total_revenue: 5400.0,
                total_units: 120,
                active_customers: 7,
            },
            &[QuarterRevenue {
                quarter: date(2024, 7, 1),
                revenue: 5400.0,
                quarter_label: "Q3 2024".into(),
            }],
            &[MedicineRevenue {
                name: "Paracetamol".into(),
                revenue: 2100.0,
            }],
            &[],
            &[CustomerSpend {
                name: "Asha".into(),
                spend: 900.0,
            }],
            vec![NearExpiryItem {
                name: "Amoxicillin".into(),
                batch_no: Some("B-17".into()),
                expiry_date: date(2024, 9, 30),
                stock_qty: 40,
            }],
        );

        let value = serde_json::to_value(&view).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["figures", "kpis", "near_expiry"]);

        let mut figure_keys: Vec<&str> = value["figures"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        figure_keys.sort_unstable();
        assert_eq!(
            figure_keys,
            ["indicators", "low_stock", "quarterly_sales", "top_customers", "top_medicines"]
        );

        assert_eq!(value["kpis"]["total_units"], 120);
        assert_eq!(value["figures"]["indicators"].as_array().unwrap().len(), 3);
        assert_eq!(value["figures"]["quarterly_sales"]["data"][0]["x"], json!(["Q3 2024"]));
        assert_eq!(value["figures"]["low_stock"]["data"][0]["y"], json!([]));
        assert_eq!(value["near_expiry"][0]["batch_no"], "B-17");
        assert_eq!(value["near_expiry"][0]["expiry_date"], "2024-09-30");
    }
}
