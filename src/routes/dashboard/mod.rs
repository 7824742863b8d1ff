mod cache;
pub mod charts;
mod handler;
mod model;

pub use cache::QueryCache;
pub use handler::{DashboardFigures, DashboardView, get_dashboard};
pub use model::{
    CustomerSpend, Kpis, LowStockItem, MedicineRevenue, NearExpiryItem, QuarterRevenue,
    label_quarters, quarter_label,
};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("dashboard query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cached dashboard result is unreadable: {0}")]
    Cache(#[from] serde_json::Error),
}
