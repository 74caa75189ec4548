//! Canonical order mapping and duplicate reconciliation.
//!
//! One provider posting becomes one [`MappedOrder`]; postings sharing an
//! order number (the same logical order surfaced by multiple listing calls)
//! are merged by [`aggregate_postings`]. Money stays f64 until persistence,
//! where it is converted to fixed-point decimals.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::services::value_utils::{
    datetime_at, first_non_zero, number_at, string_at, to_currency, to_number, value_at,
};

const DEFAULT_CURRENCY: &str = "USD";
const ITEM_NAME_PLACEHOLDER: &str = "item";

/// Canonical order lifecycle state. Unknown provider statuses map to
/// `Pending` so an unrecognized value never blocks ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "awaiting_approve" | "awaiting_deliver" | "awaiting_packaging" | "confirmed" => {
                OrderStatus::Confirmed
            }
            "delivering" | "driver_pickup" | "shipped" | "sent_by_seller" => OrderStatus::Shipped,
            "delivered" | "received" => OrderStatus::Delivered,
            "cancelled" | "canceled" | "not_accepted" | "returned" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Settlement state. An explicit paid flag always wins; otherwise it is
/// derived from the raw provider status, defaulting to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Partial,
    Settled,
    Cancelled,
}

impl SettlementStatus {
    pub fn derive(paid: bool, raw_status: &str) -> Self {
        if paid {
            return SettlementStatus::Settled;
        }
        match raw_status.trim().to_ascii_lowercase().as_str() {
            "paid" | "delivered" | "received" => SettlementStatus::Settled,
            "delivering" | "awaiting_deliver" | "driver_pickup" => SettlementStatus::Partial,
            "cancelled" | "canceled" | "not_accepted" | "returned" => SettlementStatus::Cancelled,
            _ => SettlementStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Partial => "partial",
            SettlementStatus::Settled => "settled",
            SettlementStatus::Cancelled => "cancelled",
        }
    }
}

/// A canonical order before persistence; money fields are rounded f64.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_no: String,
    pub site_id: String,
    pub channel: String,
    pub status: OrderStatus,
    pub settlement_status: SettlementStatus,
    pub settlement_date: Option<DateTime<Utc>>,
    pub placed_at: DateTime<Utc>,
    pub currency: String,
    pub subtotal: f64,
    pub discount: f64,
    pub shipping_fee: f64,
    pub tax: f64,
    pub total: f64,
    pub cost_of_goods: f64,
    pub logistics_cost: f64,
    pub remark: Value,
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub sku: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount: f64,
    pub tax: f64,
    pub cost_price: Option<f64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MappedOrder {
    pub order: OrderRecord,
    pub items: Vec<ItemRecord>,
}

// Price candidates, in precedence order. First non-zero numeric wins so
// zero-valued placeholder fields never mask a real price.
const ITEM_PRICE_PATHS: &[&[&str]] = &[
    &["client_price"],
    &["price"],
    &["price_data", "price"],
    &["price_data", "old_price"],
    &["price_without_discount"],
    &["item_price"],
];

const ORDER_TOTAL_PATHS: &[&[&str]] = &[
    &["analytics_data", "revenue"],
    &["analytics_data", "ordered_amount"],
    &["financial_data", "order_amount"],
];

const SHIPPING_PATHS: &[&[&str]] = &[
    &["analytics_data", "delivery_amount"],
    &["financial_data", "delivery_price"],
    &["shipping_fee"],
];

/// Convert one raw posting into the canonical order + items shape.
/// Returns `None` only when no order number can be found anywhere.
pub fn map_posting_to_order(raw: &Value, site_id: &str, channel: &str) -> Option<MappedOrder> {
    let order_no = string_at(raw, &["order_number"])
        .or_else(|| string_at(raw, &["posting_number"]))
        .or_else(|| string_at(raw, &["order_id"]))?;

    let raw_status = string_at(raw, &["status"]).unwrap_or_default();
    let status = OrderStatus::from_provider(&raw_status);
    let paid = value_at(raw, &["financial_data", "posting_is_paid"])
        .or_else(|| value_at(raw, &["is_paid"]))
        .or_else(|| value_at(raw, &["paid"]))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let settlement_status = SettlementStatus::derive(paid, &raw_status);

    let items = extract_items(raw);
    // Unresolved currency stays empty so a later duplicate posting that does
    // carry a code is not shadowed by the default; the default is applied
    // once after aggregation.
    let currency = resolve_currency(raw).unwrap_or_default();

    let subtotal = to_currency(
        items
            .iter()
            .map(|item| item.unit_price * item.quantity as f64)
            .sum(),
    );
    let discount = to_currency(items.iter().map(|item| item.discount).sum());
    let tax = to_currency(items.iter().map(|item| item.tax).sum());
    let shipping_fee = to_currency(first_non_zero(raw, SHIPPING_PATHS).unwrap_or(0.0).abs());
    let logistics_cost = to_currency(sum_negative_services(raw).abs());
    let cost_of_goods = to_currency(
        items
            .iter()
            .map(|item| item.cost_price.unwrap_or(0.0) * item.quantity as f64)
            .sum(),
    );
    let total = first_non_zero(raw, ORDER_TOTAL_PATHS)
        .filter(|amount| *amount != 0.0)
        .map(to_currency)
        .unwrap_or_else(|| to_currency(subtotal - discount));

    let placed_at = resolve_placed_at(raw);
    let settlement_date = datetime_at(raw, &["delivered_at"])
        .or_else(|| datetime_at(raw, &["execution_date"]))
        .or_else(|| datetime_at(raw, &["shipped_at"]));

    let mut remark = json!({ "postings": [order_no_source(raw, &order_no)] });
    if let Some(reason) = string_at(raw, &["cancellation", "cancel_reason"]) {
        remark["cancel_reason"] = Value::String(reason);
    }

    Some(MappedOrder {
        order: OrderRecord {
            order_no,
            site_id: site_id.to_string(),
            channel: channel.to_string(),
            status,
            settlement_status,
            settlement_date,
            placed_at,
            currency,
            subtotal,
            discount,
            shipping_fee,
            tax,
            total,
            cost_of_goods,
            logistics_cost,
            remark,
        },
        items,
    })
}

/// Merge mapped postings by order number.
///
/// Numeric totals are summed, items concatenated, `placed_at` takes the
/// earliest value, and categorical fields take the most recently seen
/// non-empty value. Pages arrive oldest-first from the provider, so "most
/// recently seen" deliberately means "later page wins". First-seen order of
/// order numbers is preserved.
pub fn aggregate_postings(raw_list: &[Value], site_id: &str, channel: &str) -> Vec<MappedOrder> {
    let mapped = raw_list
        .iter()
        .filter_map(|raw| {
            let mapped = map_posting_to_order(raw, site_id, channel);
            if mapped.is_none() {
                tracing::warn!("skipping posting without an order number");
            }
            mapped
        })
        .collect();
    aggregate_mapped(mapped)
}

/// Merge already-mapped orders by order number. Used directly when postings
/// from several endpoints (carrying different channels) feed one sync.
pub fn aggregate_mapped(mapped_list: Vec<MappedOrder>) -> Vec<MappedOrder> {
    let mut by_order_no: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<MappedOrder> = Vec::new();

    for mapped in mapped_list {
        match by_order_no.get(&mapped.order.order_no) {
            Some(&idx) => merge_order_records(&mut merged[idx], mapped),
            None => {
                by_order_no.insert(mapped.order.order_no.clone(), merged.len());
                merged.push(mapped);
            }
        }
    }

    for mapped in &mut merged {
        if mapped.order.currency.is_empty() {
            mapped.order.currency = DEFAULT_CURRENCY.to_string();
        }
    }

    merged
}

fn merge_order_records(existing: &mut MappedOrder, incoming: MappedOrder) {
    let target = &mut existing.order;
    let source = incoming.order;

    target.subtotal = to_currency(target.subtotal + source.subtotal);
    target.discount = to_currency(target.discount + source.discount);
    target.shipping_fee = to_currency(target.shipping_fee + source.shipping_fee);
    target.tax = to_currency(target.tax + source.tax);
    target.total = to_currency(target.total + source.total);
    target.cost_of_goods = to_currency(target.cost_of_goods + source.cost_of_goods);
    target.logistics_cost = to_currency(target.logistics_cost + source.logistics_cost);

    target.status = source.status;
    target.settlement_status = source.settlement_status;
    if !source.channel.is_empty() {
        target.channel = source.channel;
    }
    if !source.currency.is_empty() {
        target.currency = source.currency;
    }
    if source.settlement_date.is_some() {
        target.settlement_date = source.settlement_date;
    }
    if source.placed_at < target.placed_at {
        target.placed_at = source.placed_at;
    }

    if let (Some(dst), Some(src)) = (
        target.remark.get_mut("postings").and_then(Value::as_array_mut),
        source.remark.get("postings").and_then(Value::as_array),
    ) {
        for posting in src {
            if !dst.contains(posting) {
                dst.push(posting.clone());
            }
        }
    }
    if let Some(reason) = source.remark.get("cancel_reason") {
        target.remark["cancel_reason"] = reason.clone();
    }

    // Items are physically distinct line entries, never deduplicated
    existing.items.extend(incoming.items);
}

/// Financial substructures carry cost data the flat product list lacks, so
/// they are preferred when present.
fn extract_items(raw: &Value) -> Vec<ItemRecord> {
    let products = value_at(raw, &["financial_data", "products"])
        .and_then(Value::as_array)
        .filter(|list| !list.is_empty())
        .or_else(|| value_at(raw, &["products"]).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default();

    products
        .iter()
        .enumerate()
        .map(|(i, product)| map_item(product, i))
        .collect()
}

fn map_item(product: &Value, index: usize) -> ItemRecord {
    let sku = string_at(product, &["offer_id"])
        .or_else(|| string_at(product, &["sku"]))
        .unwrap_or_else(|| format!("item-{}", index + 1));
    let quantity = number_at(product, &["quantity"])
        .filter(|q| *q >= 1.0)
        .map(|q| q as i64)
        .unwrap_or(1);
    let unit_price = to_currency(first_non_zero(product, ITEM_PRICE_PATHS).unwrap_or(0.0));
    let discount = to_currency(
        first_non_zero(product, &[&["total_discount_value"], &["discount_amount"]])
            .unwrap_or(0.0)
            .abs(),
    );
    let tax = to_currency(
        first_non_zero(product, &[&["tax"], &["tax_amount"]])
            .unwrap_or(0.0)
            .abs(),
    );
    let cost_price = first_non_zero(product, &[&["cost_price"], &["purchase_price"]])
        .filter(|cost| *cost != 0.0)
        .map(to_currency);

    ItemRecord {
        sku,
        product_name: string_at(product, &["name"]),
        quantity,
        unit_price,
        discount,
        tax,
        cost_price,
        image: string_at(product, &["image"]).or_else(|| string_at(product, &["picture"])),
    }
}

fn resolve_currency(raw: &Value) -> Option<String> {
    if let Some(code) = string_at(raw, &["analytics_data", "currency_code"]) {
        return Some(code);
    }
    let raw_items = value_at(raw, &["financial_data", "products"])
        .or_else(|| value_at(raw, &["products"]))
        .and_then(Value::as_array);
    if let Some(list) = raw_items {
        for product in list {
            if let Some(code) =
                string_at(product, &["currency_code"]).or_else(|| string_at(product, &["currency"]))
            {
                return Some(code);
            }
        }
    }
    string_at(raw, &["financial_data", "currency_code"])
}

/// Service line items are signed; costs the seller bears appear as negative
/// amounts. Logistics cost is the magnitude of those negative entries.
fn sum_negative_services(raw: &Value) -> f64 {
    let mut sum = 0.0;
    for path in [
        &["financial_data", "posting_services"] as &[&str],
        &["financial_data", "services"],
    ] {
        if let Some(services) = value_at(raw, path).and_then(Value::as_object) {
            for value in services.values() {
                if let Some(amount) = to_number(value) {
                    if amount < 0.0 {
                        sum += amount;
                    }
                }
            }
        }
    }
    sum
}

fn resolve_placed_at(raw: &Value) -> DateTime<Utc> {
    datetime_at(raw, &["in_process_at"])
        .or_else(|| datetime_at(raw, &["created_at"]))
        .or_else(|| datetime_at(raw, &["shipped_at"]))
        .or_else(|| datetime_at(raw, &["delivery_due_date"]))
        .or_else(|| datetime_at(raw, &["delivered_at"]))
        .unwrap_or_else(Utc::now)
}

fn order_no_source(raw: &Value, order_no: &str) -> String {
    string_at(raw, &["posting_number"]).unwrap_or_else(|| order_no.to_string())
}

pub fn item_name_or_placeholder(item: &ItemRecord) -> String {
    item.product_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if item.sku.trim().is_empty() {
                ITEM_NAME_PLACEHOLDER.to_string()
            } else {
                item.sku.clone()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paid_delivered_posting() -> Value {
        json!({
            "posting_number": "0051-1234-1",
            "order_number": "0051-1234",
            "status": "delivered",
            "in_process_at": "2025-02-01T09:00:00Z",
            "delivered_at": "2025-02-04T17:30:00Z",
            "analytics_data": { "currency_code": "EUR", "revenue": 200 },
            "financial_data": {
                "posting_is_paid": true,
                "posting_services": { "marketplace_service_item_deliv_to_customer": -5, "item_return": -3, "bonus": 2 },
                "products": [
                    { "offer_id": "SKU-A", "name": "Desk lamp", "price": 50, "quantity": 2 },
                    { "offer_id": "SKU-B", "name": "Bulb", "client_price": "20", "price": 0, "quantity": 3 }
                ]
            }
        })
    }

    #[test]
    fn maps_totals_statuses_and_timestamps() {
        let mapped = map_posting_to_order(&paid_delivered_posting(), "site-1", "fbs").unwrap();
        let order = &mapped.order;

        assert_eq!(order.order_no, "0051-1234");
        assert_eq!(order.channel, "fbs");
        assert_eq!(order.currency, "EUR");
        // 2×50 + 3×20
        assert_eq!(order.subtotal, 160.0);
        assert_eq!(order.total, 200.0);
        assert_eq!(order.logistics_cost, 8.0);
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.settlement_status, SettlementStatus::Settled);
        assert_eq!(order.placed_at.to_rfc3339(), "2025-02-01T09:00:00+00:00");
        assert_eq!(
            order.settlement_date.unwrap().to_rfc3339(),
            "2025-02-04T17:30:00+00:00"
        );

        assert_eq!(mapped.items.len(), 2);
        assert_eq!(mapped.items[0].unit_price, 50.0);
        // Zero placeholder price must not mask the real client price
        assert_eq!(mapped.items[1].unit_price, 20.0);
        assert_eq!(mapped.items[1].quantity, 3);
    }

    #[test]
    fn paid_flag_settles_regardless_of_status() {
        let raw = json!({
            "posting_number": "P-1",
            "status": "delivering",
            "financial_data": {
                "posting_is_paid": true,
                "products": [{ "sku": "X", "price": 50, "quantity": 2 }]
            }
        });
        let mapped = map_posting_to_order(&raw, "site-1", "fbs").unwrap();
        assert_eq!(mapped.order.settlement_status, SettlementStatus::Settled);
        assert_eq!(mapped.order.total, 100.0);
        assert_eq!(mapped.order.status, OrderStatus::Shipped);
    }

    #[test]
    fn unknown_status_defaults_to_pending() {
        let raw = json!({ "posting_number": "P-2", "status": "quantum_flux", "products": [] });
        let mapped = map_posting_to_order(&raw, "site-1", "fbo").unwrap();
        assert_eq!(mapped.order.status, OrderStatus::Pending);
        assert_eq!(mapped.order.settlement_status, SettlementStatus::Pending);
    }

    #[test]
    fn missing_order_number_is_skipped_not_fatal() {
        let raw = json!({ "status": "delivered" });
        assert!(map_posting_to_order(&raw, "site-1", "fbs").is_none());
        let merged = aggregate_postings(&[raw, json!({ "posting_number": "P-3" })], "site-1", "fbs");
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn flat_product_list_is_the_fallback() {
        let raw = json!({
            "posting_number": "P-4",
            "products": [{ "offer_id": "F-1", "price": 10 }]
        });
        let merged = aggregate_postings(&[raw], "site-1", "fbo");
        let mapped = &merged[0];
        assert_eq!(mapped.items.len(), 1);
        assert_eq!(mapped.items[0].quantity, 1);
        assert_eq!(mapped.order.subtotal, 10.0);
        // No analytics revenue: total falls back to subtotal - discount
        assert_eq!(mapped.order.total, 10.0);
        // No currency anywhere in the posting: the fixed default applies
        assert_eq!(mapped.order.currency, "USD");
    }

    #[test]
    fn duplicate_order_numbers_merge_into_one_record() {
        let first = json!({
            "posting_number": "0051-9-1",
            "order_number": "0051-9",
            "status": "delivering",
            "in_process_at": "2025-02-01T08:00:00Z",
            "analytics_data": { "revenue": 120, "currency_code": "EUR" },
            "financial_data": {
                "products": [{ "offer_id": "A", "price": 60, "quantity": 2 }]
            }
        });
        let second = json!({
            "posting_number": "0051-9-2",
            "order_number": "0051-9",
            "status": "delivered",
            "in_process_at": "2025-02-02T08:00:00Z",
            "delivered_at": "2025-02-05T12:00:00Z",
            "analytics_data": { "revenue": 30 },
            "financial_data": {
                "posting_is_paid": true,
                "products": [{ "offer_id": "B", "price": 30, "quantity": 1 }]
            }
        });

        let merged = aggregate_postings(&[first, second], "site-1", "fbs");
        assert_eq!(merged.len(), 1);
        let order = &merged[0].order;

        assert_eq!(order.subtotal, 150.0);
        assert_eq!(order.total, 150.0);
        // Later page wins for categorical fields
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.settlement_status, SettlementStatus::Settled);
        assert_eq!(order.currency, "EUR");
        // Earliest placed_at survives the merge
        assert_eq!(order.placed_at.to_rfc3339(), "2025-02-01T08:00:00+00:00");
        assert_eq!(merged[0].items.len(), 2);

        let postings = order.remark["postings"].as_array().unwrap();
        assert_eq!(postings.len(), 2);
    }

    #[test]
    fn item_costs_are_carried_per_item_and_summed_into_cost_of_goods() {
        let raw = json!({
            "posting_number": "P-5",
            "financial_data": {
                "products": [
                    { "offer_id": "A", "price": 50, "quantity": 2, "cost_price": 18.5 },
                    { "offer_id": "B", "price": 30, "quantity": 1, "purchase_price": "12" },
                    { "offer_id": "C", "price": 10, "quantity": 1, "cost_price": 0 }
                ]
            }
        });
        let mapped = map_posting_to_order(&raw, "site-1", "fbs").unwrap();

        assert_eq!(mapped.items[0].cost_price, Some(18.5));
        assert_eq!(mapped.items[1].cost_price, Some(12.0));
        // A zero cost is a placeholder, not a real value
        assert_eq!(mapped.items[2].cost_price, None);
        // 2×18.5 + 1×12
        assert_eq!(mapped.order.cost_of_goods, 49.0);
    }

    #[test]
    fn item_name_falls_back_to_sku_then_placeholder() {
        let named = ItemRecord {
            sku: "S-1".into(),
            product_name: Some("Lamp".into()),
            quantity: 1,
            unit_price: 1.0,
            discount: 0.0,
            tax: 0.0,
            cost_price: None,
            image: None,
        };
        assert_eq!(item_name_or_placeholder(&named), "Lamp");

        let unnamed = ItemRecord { product_name: Some("  ".into()), ..named.clone() };
        assert_eq!(item_name_or_placeholder(&unnamed), "S-1");

        let bare = ItemRecord { sku: "".into(), product_name: None, ..named };
        assert_eq!(item_name_or_placeholder(&bare), "item");
    }
}
