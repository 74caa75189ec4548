use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entities::{order_items, orders};

/// Inputs for one order sync invocation, already parsed and clamped.
#[derive(Debug, Clone)]
pub struct SyncOrdersRequest {
    pub site: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u64,
    pub should_sync: bool,
    pub force_refresh: bool,
}

/// One optional endpoint that failed without aborting the sync.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointFailure {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

/// What a sync actually did: raw postings fetched per channel, canonical
/// orders persisted, and any degraded endpoints.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SyncSummary {
    pub fetched: usize,
    pub persisted: usize,
    pub endpoints: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EndpointFailure>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub sku: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_no: String,
    pub site_id: String,
    pub platform: String,
    pub channel: Option<String>,
    pub status: String,
    pub settlement_status: String,
    pub settlement_date: Option<NaiveDate>,
    pub placed_at: DateTime<Utc>,
    pub currency: String,
    pub subtotal: f64,
    pub discount: f64,
    pub shipping_fee: f64,
    pub tax: f64,
    pub total: f64,
    pub cost_of_goods: f64,
    pub logistics_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<Value>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    pub fn from_models(order: orders::Model, items: Vec<order_items::Model>) -> Self {
        Self {
            order_no: order.order_no,
            site_id: order.site_id,
            platform: order.platform,
            channel: order.channel,
            status: order.status,
            settlement_status: order.settlement_status,
            settlement_date: order.settlement_date,
            placed_at: order.placed_at.with_timezone(&Utc),
            currency: order.currency,
            subtotal: decimal_to_f64(&order.subtotal),
            discount: decimal_to_f64(&order.discount),
            shipping_fee: decimal_to_f64(&order.shipping_fee),
            tax: decimal_to_f64(&order.tax),
            total: decimal_to_f64(&order.total),
            cost_of_goods: decimal_to_f64(&order.cost_of_goods),
            logistics_cost: decimal_to_f64(&order.logistics_cost),
            remark: order.remark,
            items: items.into_iter().map(OrderItemView::from_model).collect(),
        }
    }
}

impl OrderItemView {
    fn from_model(item: order_items::Model) -> Self {
        Self {
            sku: item.sku,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: decimal_to_f64(&item.unit_price),
            total_price: decimal_to_f64(&item.total_price),
            cost_price: item.cost_price.as_ref().map(decimal_to_f64),
            image: item.product_image,
        }
    }
}

fn decimal_to_f64(value: &rust_decimal::Decimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SyncOrdersResponse {
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
    pub range: DateRange,
    pub orders: Vec<OrderView>,
}
