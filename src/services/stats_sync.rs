//! Traffic/sales stats sync: daily site metrics plus optional per-product
//! metrics, fetched concurrently, upserted by their natural keys, then read
//! back for the caller.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::entities::{prelude::*, product_metrics_daily, site_metrics_daily};
use crate::error::SyncError;
use crate::models::order::EndpointFailure;
use crate::models::stats::{
    DailyMetricView, ProductMetricView, StatsSummary, StatsTotals, SyncStatsRequest,
    SyncStatsResponse,
};
use crate::services::provider_api::ApiClient;
use crate::services::provider_auth::TokenService;
use crate::services::site_resolver::{resolve_site, ResolvedSite};
use crate::services::value_utils::{normalize_range, parse_stat_date, string_at, to_number};
use crate::MarketplaceConfig;

const DAILY_METRICS_PATH: &str = "/v1/analytics/site/daily";
const PRODUCT_METRICS_PATH: &str = "/v1/analytics/product/daily";
const DAILY_READBACK_LIMIT: u64 = 60;
const PRODUCT_READBACK_LIMIT: u64 = 100;
const DEFAULT_CHANNEL: &str = "organic";

const DAILY_FIELDS: &[&str] = &[
    "impressions",
    "visitors",
    "add_to_cart",
    "orders",
    "payments",
    "revenue",
];

/// One provider metrics row coerced into typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
struct MetricValues {
    impressions: i64,
    visitors: i64,
    add_to_cart: i64,
    orders: i64,
    payments: i64,
    revenue: f64,
    currency: Option<String>,
}

#[derive(Clone)]
pub struct StatsSyncService {
    config: MarketplaceConfig,
    http: Client,
    tokens: TokenService,
}

impl StatsSyncService {
    pub fn new(config: MarketplaceConfig, http: Client, tokens: TokenService) -> Self {
        Self {
            config,
            http,
            tokens,
        }
    }

    pub async fn sync_stats(
        &self,
        db: &DatabaseConnection,
        request: SyncStatsRequest,
    ) -> Result<SyncStatsResponse, SyncError> {
        let (from, to) = normalize_range(request.from, request.to);
        let site = resolve_site(db, &request.site, &self.config.platform).await?;

        let mut errors: Vec<EndpointFailure> = Vec::new();
        if request.should_sync {
            errors = self.fetch_and_persist(db, &site, from, to, request.force_refresh).await?;
        }

        let daily = self.query_daily(db, &site, from, to).await?;
        let products = self.query_products(db, &site, from, to).await?;

        let mut summary = build_summary(&daily, &products);
        summary.errors = errors;

        Ok(SyncStatsResponse {
            synced: request.should_sync,
            field_availability: derive_field_availability(&daily),
            summary,
            daily,
            products,
        })
    }

    /// Daily site metrics are mandatory; per-product metrics degrade to a
    /// recorded failure when the provider cannot serve them.
    async fn fetch_and_persist(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Vec<EndpointFailure>, SyncError> {
        let credentials = self.tokens.ensure_access_token(db, &site.id, force_refresh).await?;
        let api_host = site.api_host.as_deref().unwrap_or(&self.config.api_host);
        let api = ApiClient::new(self.http.clone(), api_host, &credentials.access_token);

        let body = json!({
            "date_from": from.date_naive().to_string(),
            "date_to": to.date_naive().to_string(),
        });

        let (daily_payload, product_payload) = tokio::join!(
            api.call_api("site-metrics", DAILY_METRICS_PATH, &body),
            api.call_api("product-metrics", PRODUCT_METRICS_PATH, &body),
        );

        let daily_payload = daily_payload?;
        let daily_rows: Vec<_> = records_from_payload(&daily_payload)
            .iter()
            .filter_map(map_daily_row)
            .collect();
        self.persist_daily(db, site, &daily_rows).await?;

        let mut errors = Vec::new();
        match product_payload {
            Ok(payload) => {
                let product_rows: Vec<_> = records_from_payload(&payload)
                    .iter()
                    .filter_map(map_product_row)
                    .collect();
                self.persist_products(db, site, &product_rows).await?;
            }
            Err(err) => {
                tracing::warn!("product metrics degraded for site {}: {}", site.id, err);
                let status = match &err {
                    SyncError::EndpointFetchFailed { status, .. } => *status,
                    _ => None,
                };
                errors.push(EndpointFailure {
                    endpoint: "product-metrics".to_string(),
                    status,
                    message: err.to_string(),
                });
            }
        }

        tracing::info!("site {}: persisted {} daily metric rows", site.id, daily_rows.len());
        Ok(errors)
    }

    async fn persist_daily(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        rows: &[(NaiveDate, String, MetricValues)],
    ) -> Result<(), SyncError> {
        if rows.is_empty() {
            return Ok(());
        }
        let models: Vec<site_metrics_daily::ActiveModel> = rows
            .iter()
            .map(|(stat_date, channel, values)| site_metrics_daily::ActiveModel {
                site: Set(site.id.clone()),
                platform: Set(self.config.platform.clone()),
                channel: Set(channel.clone()),
                stat_date: Set(*stat_date),
                impressions: Set(values.impressions),
                visitors: Set(values.visitors),
                add_to_cart: Set(values.add_to_cart),
                orders: Set(values.orders),
                payments: Set(values.payments),
                revenue: Set(to_decimal(values.revenue)),
                currency: Set(values.currency.clone()),
                ..Default::default()
            })
            .collect();

        SiteMetricsDaily::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    site_metrics_daily::Column::Site,
                    site_metrics_daily::Column::Channel,
                    site_metrics_daily::Column::StatDate,
                ])
                .update_columns([
                    site_metrics_daily::Column::Impressions,
                    site_metrics_daily::Column::Visitors,
                    site_metrics_daily::Column::AddToCart,
                    site_metrics_daily::Column::Orders,
                    site_metrics_daily::Column::Payments,
                    site_metrics_daily::Column::Revenue,
                    site_metrics_daily::Column::Currency,
                ])
                .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    async fn persist_products(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        rows: &[(NaiveDate, String, Option<String>, MetricValues)],
    ) -> Result<(), SyncError> {
        if rows.is_empty() {
            return Ok(());
        }
        let models: Vec<product_metrics_daily::ActiveModel> = rows
            .iter()
            .map(|(stat_date, sku, name, values)| product_metrics_daily::ActiveModel {
                site: Set(site.id.clone()),
                platform: Set(self.config.platform.clone()),
                sku: Set(sku.clone()),
                stat_date: Set(*stat_date),
                product_name: Set(name.clone()),
                impressions: Set(values.impressions),
                visitors: Set(values.visitors),
                add_to_cart: Set(values.add_to_cart),
                orders: Set(values.orders),
                payments: Set(values.payments),
                revenue: Set(to_decimal(values.revenue)),
                currency: Set(values.currency.clone()),
                ..Default::default()
            })
            .collect();

        ProductMetricsDaily::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    product_metrics_daily::Column::Site,
                    product_metrics_daily::Column::Sku,
                    product_metrics_daily::Column::StatDate,
                ])
                .update_columns([
                    product_metrics_daily::Column::ProductName,
                    product_metrics_daily::Column::Impressions,
                    product_metrics_daily::Column::Visitors,
                    product_metrics_daily::Column::AddToCart,
                    product_metrics_daily::Column::Orders,
                    product_metrics_daily::Column::Payments,
                    product_metrics_daily::Column::Revenue,
                    product_metrics_daily::Column::Currency,
                ])
                .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    async fn query_daily(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DailyMetricView>, SyncError> {
        let rows = SiteMetricsDaily::find()
            .filter(site_metrics_daily::Column::Site.eq(&site.id))
            .filter(site_metrics_daily::Column::Platform.eq(&self.config.platform))
            .filter(site_metrics_daily::Column::StatDate.gte(from.date_naive()))
            .filter(site_metrics_daily::Column::StatDate.lte(to.date_naive()))
            .order_by_desc(site_metrics_daily::Column::StatDate)
            .limit(DAILY_READBACK_LIMIT)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(DailyMetricView::from_model).collect())
    }

    async fn query_products(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProductMetricView>, SyncError> {
        let rows = ProductMetricsDaily::find()
            .filter(product_metrics_daily::Column::Site.eq(&site.id))
            .filter(product_metrics_daily::Column::Platform.eq(&self.config.platform))
            .filter(product_metrics_daily::Column::StatDate.gte(from.date_naive()))
            .filter(product_metrics_daily::Column::StatDate.lte(to.date_naive()))
            .order_by_desc(product_metrics_daily::Column::StatDate)
            .order_by_desc(product_metrics_daily::Column::Revenue)
            .limit(PRODUCT_READBACK_LIMIT)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(ProductMetricView::from_model).collect())
    }
}

/// Metric rows may live under `data.records`, `data`, or `result`.
fn records_from_payload(payload: &Value) -> Vec<Value> {
    let data = payload.get("data").unwrap_or(payload);
    let list = data
        .get("records")
        .or_else(|| payload.get("result"))
        .unwrap_or(data);
    list.as_array().cloned().unwrap_or_default()
}

fn map_metric_values(row: &Value) -> MetricValues {
    MetricValues {
        impressions: count_field(row, &["impressions", "views", "pv"]),
        visitors: count_field(row, &["visitors", "uv", "unique_visitors"]),
        add_to_cart: count_field(row, &["add_to_cart", "atc", "cart_adds"]),
        orders: count_field(row, &["orders", "order_count"]),
        payments: count_field(row, &["payments", "paid_orders"]),
        revenue: row
            .get("revenue")
            .or_else(|| row.get("payment_amount"))
            .or_else(|| row.get("gmv"))
            .and_then(to_number)
            .unwrap_or(0.0),
        currency: string_at(row, &["currency"]).or_else(|| string_at(row, &["currency_code"])),
    }
}

/// A daily row needs at least a parseable date; everything else defaults.
fn map_daily_row(row: &Value) -> Option<(NaiveDate, String, MetricValues)> {
    let stat_date = stat_date_of(row)?;
    let channel = string_at(row, &["channel"])
        .or_else(|| string_at(row, &["traffic_source"]))
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    Some((stat_date, channel, map_metric_values(row)))
}

/// A product row needs a date and a SKU.
fn map_product_row(row: &Value) -> Option<(NaiveDate, String, Option<String>, MetricValues)> {
    let stat_date = stat_date_of(row)?;
    let sku = string_at(row, &["sku"])
        .or_else(|| string_at(row, &["offer_id"]))
        .or_else(|| string_at(row, &["product_id"]))?;
    let name = string_at(row, &["product_name"]).or_else(|| string_at(row, &["name"]));
    Some((stat_date, sku, name, map_metric_values(row)))
}

fn stat_date_of(row: &Value) -> Option<NaiveDate> {
    string_at(row, &["stat_date"])
        .or_else(|| string_at(row, &["date"]))
        .or_else(|| string_at(row, &["day"]))
        .as_deref()
        .and_then(parse_stat_date)
}

fn count_field(row: &Value, candidates: &[&str]) -> i64 {
    for key in candidates {
        if let Some(num) = row.get(*key).and_then(to_number) {
            return num as i64;
        }
    }
    0
}

fn build_summary(daily: &[DailyMetricView], products: &[ProductMetricView]) -> StatsSummary {
    let mut totals = StatsTotals::default();
    for row in daily {
        totals.impressions += row.impressions;
        totals.visitors += row.visitors;
        totals.add_to_cart += row.add_to_cart;
        totals.orders += row.orders;
        totals.payments += row.payments;
        totals.revenue += row.revenue;
    }
    totals.revenue = (totals.revenue * 100.0).round() / 100.0;
    StatsSummary {
        days: daily.len(),
        products: products.len(),
        totals,
        errors: Vec::new(),
    }
}

/// A field is available when any returned day reports a non-zero value.
fn derive_field_availability(daily: &[DailyMetricView]) -> BTreeMap<String, bool> {
    let mut availability = BTreeMap::new();
    for field in DAILY_FIELDS {
        let present = daily.iter().any(|row| match *field {
            "impressions" => row.impressions != 0,
            "visitors" => row.visitors != 0,
            "add_to_cart" => row.add_to_cart != 0,
            "orders" => row.orders != 0,
            "payments" => row.payments != 0,
            "revenue" => row.revenue != 0.0,
            _ => false,
        });
        availability.insert(field.to_string(), present);
    }
    availability
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(2))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_are_found_under_known_shapes() {
        let nested = json!({ "data": { "records": [{ "date": "2025-03-01" }] } });
        assert_eq!(records_from_payload(&nested).len(), 1);

        let flat = json!({ "data": [{ "date": "2025-03-01" }, { "date": "2025-03-02" }] });
        assert_eq!(records_from_payload(&flat).len(), 2);

        let result = json!({ "result": [{ "date": "2025-03-01" }] });
        assert_eq!(records_from_payload(&result).len(), 1);

        assert!(records_from_payload(&json!({ "data": {} })).is_empty());
    }

    #[test]
    fn daily_rows_default_channel_and_tolerate_aliases() {
        let row = json!({
            "date": "2025-03-01",
            "pv": "1200",
            "uv": 300,
            "orders": 12,
            "payment_amount": "99.95"
        });
        let (stat_date, channel, values) = map_daily_row(&row).unwrap();
        assert_eq!(stat_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(channel, "organic");
        assert_eq!(values.impressions, 1200);
        assert_eq!(values.visitors, 300);
        assert_eq!(values.orders, 12);
        assert_eq!(values.revenue, 99.95);

        assert!(map_daily_row(&json!({ "pv": 5 })).is_none());
    }

    #[test]
    fn product_rows_require_a_sku() {
        let row = json!({ "stat_date": "2025-03-02", "offer_id": "SKU-9", "revenue": 10 });
        let (_, sku, name, values) = map_product_row(&row).unwrap();
        assert_eq!(sku, "SKU-9");
        assert_eq!(name, None);
        assert_eq!(values.revenue, 10.0);

        assert!(map_product_row(&json!({ "stat_date": "2025-03-02", "revenue": 10 })).is_none());
    }

    #[test]
    fn availability_reflects_any_nonzero_day() {
        let daily = vec![
            DailyMetricView {
                stat_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                channel: "organic".into(),
                impressions: 0,
                visitors: 10,
                add_to_cart: 0,
                orders: 0,
                payments: 0,
                revenue: 0.0,
                currency: None,
            },
            DailyMetricView {
                stat_date: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
                channel: "organic".into(),
                impressions: 500,
                visitors: 0,
                add_to_cart: 0,
                orders: 2,
                payments: 0,
                revenue: 49.5,
                currency: None,
            },
        ];
        let availability = derive_field_availability(&daily);
        assert!(availability["impressions"]);
        assert!(availability["visitors"]);
        assert!(availability["orders"]);
        assert!(availability["revenue"]);
        assert!(!availability["add_to_cart"]);
        assert!(!availability["payments"]);

        let summary = build_summary(&daily, &[]);
        assert_eq!(summary.days, 2);
        assert_eq!(summary.totals.impressions, 500);
        assert_eq!(summary.totals.visitors, 10);
        assert_eq!(summary.totals.revenue, 49.5);
    }
}
