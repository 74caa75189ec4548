use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::entities::{product_metrics_daily, site_metrics_daily};
use crate::models::order::EndpointFailure;

/// Inputs for one stats sync invocation.
#[derive(Debug, Clone)]
pub struct SyncStatsRequest {
    pub site: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub should_sync: bool,
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct DailyMetricView {
    pub stat_date: NaiveDate,
    pub channel: String,
    pub impressions: i64,
    pub visitors: i64,
    pub add_to_cart: i64,
    pub orders: i64,
    pub payments: i64,
    pub revenue: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl DailyMetricView {
    pub fn from_model(row: site_metrics_daily::Model) -> Self {
        Self {
            stat_date: row.stat_date,
            channel: row.channel,
            impressions: row.impressions,
            visitors: row.visitors,
            add_to_cart: row.add_to_cart,
            orders: row.orders,
            payments: row.payments,
            revenue: row.revenue.to_string().parse().unwrap_or(0.0),
            currency: row.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductMetricView {
    pub stat_date: NaiveDate,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub impressions: i64,
    pub visitors: i64,
    pub add_to_cart: i64,
    pub orders: i64,
    pub payments: i64,
    pub revenue: f64,
}

impl ProductMetricView {
    pub fn from_model(row: product_metrics_daily::Model) -> Self {
        Self {
            stat_date: row.stat_date,
            sku: row.sku,
            product_name: row.product_name,
            impressions: row.impressions,
            visitors: row.visitors,
            add_to_cart: row.add_to_cart,
            orders: row.orders,
            payments: row.payments,
            revenue: row.revenue.to_string().parse().unwrap_or(0.0),
        }
    }
}

/// Window-level totals over the returned daily rows.
#[derive(Debug, Serialize, Default)]
pub struct StatsTotals {
    pub impressions: i64,
    pub visitors: i64,
    pub add_to_cart: i64,
    pub orders: i64,
    pub payments: i64,
    pub revenue: f64,
}

#[derive(Debug, Serialize, Default)]
pub struct StatsSummary {
    pub days: usize,
    pub products: usize,
    pub totals: StatsTotals,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EndpointFailure>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatsResponse {
    pub synced: bool,
    pub summary: StatsSummary,
    /// Which metric fields the provider actually populated in this window,
    /// so dashboards can hide columns the source never reports.
    pub field_availability: BTreeMap<String, bool>,
    pub daily: Vec<DailyMetricView>,
    pub products: Vec<ProductMetricView>,
}
