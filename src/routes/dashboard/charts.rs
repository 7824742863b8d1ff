//! 生成 Plotly 兼容的图表 JSON，样式与前端约定保持一致

use serde_json::{Value, json};

use super::model::{CustomerSpend, Kpis, LowStockItem, MedicineRevenue, QuarterRevenue};

const RUPEE_TEMPLATE: &str = "₹%{text:,.0f}";

/// 单个数值指标卡
pub fn indicator(value: f64, title: &str, prefix: Option<&str>, value_format: &str) -> Value {
    let mut number = json!({ "valueformat": value_format });
    if let Some(prefix) = prefix {
        number["prefix"] = json!(prefix);
    }

    json!({
        "data": [{
            "type": "indicator",
            "mode": "number",
            "value": value,
            "title": { "text": title },
            "number": number,
        }],
        "layout": {
            "height": 200,
            "margin": { "t": 20, "b": 0, "l": 0, "r": 0 },
        },
    })
}

pub fn kpi_indicators(kpis: &Kpis) -> Vec<Value> {
    vec![
        indicator(kpis.total_revenue, "Total Revenue", Some("₹ "), ",.0f"),
        indicator(kpis.total_units as f64, "Units Sold", None, ",d"),
        indicator(kpis.active_customers as f64, "Active Customers (6m)", None, ",d"),
    ]
}

/// 条形图参数；横向条形图的类目在 y 轴上，且自上而下排列
pub struct BarChart<'a> {
    pub categories: Vec<Value>,
    pub values: Vec<f64>,
    pub category_label: &'a str,
    pub value_label: &'a str,
    pub horizontal: bool,
    pub color_scale: &'a str,
    pub text_template: &'a str,
    pub title: Option<&'a str>,
    pub height: u32,
    pub tick_angle: Option<i32>,
}

impl BarChart<'_> {
    pub fn into_figure(self) -> Value {
        let (x, y, orientation) = if self.horizontal {
            (json!(self.values), json!(self.categories), "h")
        } else {
            (json!(self.categories), json!(self.values), "v")
        };
        let (x_label, y_label) = if self.horizontal {
            (self.value_label, self.category_label)
        } else {
            (self.category_label, self.value_label)
        };

        let mut layout = json!({
            "height": self.height,
            "xaxis": { "title": { "text": x_label } },
            "yaxis": { "title": { "text": y_label } },
            "showlegend": false,
        });
        if let Some(title) = self.title {
            layout["title"] = json!({ "text": title, "x": 0.5 });
        }
        if let Some(angle) = self.tick_angle {
            layout["xaxis"]["tickangle"] = json!(angle);
        }
        if self.horizontal {
            layout["yaxis"]["autorange"] = json!("reversed");
        }

        json!({
            "data": [{
                "type": "bar",
                "orientation": orientation,
                "x": x,
                "y": y,
                "text": self.values,
                "texttemplate": self.text_template,
                "textposition": "outside",
                "marker": {
                    "color": self.values,
                    "colorscale": self.color_scale,
                    "showscale": false,
                },
            }],
            "layout": layout,
        })
    }
}

pub fn quarterly_sales(rows: &[QuarterRevenue]) -> Value {
    BarChart {
        categories: rows.iter().map(|r| json!(r.quarter_label)).collect(),
        values: rows.iter().map(|r| r.revenue).collect(),
        category_label: "Quarter",
        value_label: "Revenue (₹)",
        horizontal: false,
        color_scale: "Blues",
        text_template: RUPEE_TEMPLATE,
        title: Some("Quarterly Sales Revenue"),
        height: 250,
        tick_angle: Some(-45),
    }
    .into_figure()
}

pub fn top_medicines(rows: &[MedicineRevenue]) -> Value {
    BarChart {
        categories: rows.iter().map(|r| json!(r.name)).collect(),
        values: rows.iter().map(|r| r.revenue).collect(),
        category_label: "Medicine",
        value_label: "Revenue (₹)",
        horizontal: true,
        color_scale: "Viridis",
        text_template: RUPEE_TEMPLATE,
        title: Some("Top 10 Medicines by Revenue"),
        height: 250,
        tick_angle: None,
    }
    .into_figure()
}

pub fn low_stock(rows: &[LowStockItem]) -> Value {
    BarChart {
        categories: rows.iter().map(|r| json!(r.name)).collect(),
        values: rows.iter().map(|r| r.stock_qty as f64).collect(),
        category_label: "Medicine",
        value_label: "Stock Qty",
        horizontal: true,
        color_scale: "Reds",
        text_template: "%{text}",
        title: None,
        height: 300,
        tick_angle: None,
    }
    .into_figure()
}

pub fn top_customers(rows: &[CustomerSpend]) -> Value {
    BarChart {
        categories: rows.iter().map(|r| json!(r.name)).collect(),
        values: rows.iter().map(|r| r.spend).collect(),
        category_label: "Customer",
        value_label: "Spend (₹)",
        horizontal: true,
        color_scale: "Teal",
        text_template: RUPEE_TEMPLATE,
        title: None,
        height: 300,
        tick_angle: None,
    }
    .into_figure()
}
