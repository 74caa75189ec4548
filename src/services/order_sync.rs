//! Order sync orchestration: resolve site, ensure credential, fetch from
//! every posting endpoint, map+aggregate, enrich, persist, and read back the
//! persisted window.

use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::entities::{order_items, orders, prelude::*};
use crate::error::SyncError;
use crate::models::order::{
    DateRange, EndpointFailure, OrderView, SyncOrdersRequest, SyncOrdersResponse, SyncSummary,
};
use crate::services::posting_mapper::{
    aggregate_mapped, item_name_or_placeholder, map_posting_to_order, MappedOrder,
};
use crate::services::product_metadata::{apply_metadata_to_items, ProductMetadataService};
use crate::services::provider_api::{ApiClient, PostingEndpoint, FBO_ENDPOINT, FBS_ENDPOINT};
use crate::services::provider_auth::TokenService;
use crate::services::site_resolver::{resolve_site, ResolvedSite};
use crate::services::value_utils::normalize_range;
use crate::MarketplaceConfig;

const MIN_LIMIT: u64 = 1;
const MAX_LIMIT: u64 = 500;

#[derive(Clone)]
pub struct OrderSyncService {
    config: MarketplaceConfig,
    http: Client,
    tokens: TokenService,
    metadata: ProductMetadataService,
}

impl OrderSyncService {
    pub fn new(
        config: MarketplaceConfig,
        http: Client,
        tokens: TokenService,
        metadata: ProductMetadataService,
    ) -> Self {
        Self {
            config,
            http,
            tokens,
            metadata,
        }
    }

    /// Run one sync invocation. With `should_sync=false` the provider is not
    /// contacted at all and only the read-back query executes.
    pub async fn sync_orders(
        &self,
        db: &DatabaseConnection,
        request: SyncOrdersRequest,
    ) -> Result<SyncOrdersResponse, SyncError> {
        let (from, to) = normalize_range(request.from, request.to);
        let limit = request.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        let site = resolve_site(db, &request.site, &self.config.platform).await?;

        let summary = if request.should_sync {
            Some(self.fetch_and_persist(db, &site, from, to, request.force_refresh).await?)
        } else {
            None
        };

        let orders = self.query_orders(db, &site, from, to, limit).await?;
        Ok(SyncOrdersResponse {
            synced: request.should_sync,
            summary,
            range: DateRange { from, to },
            orders,
        })
    }

    async fn fetch_and_persist(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<SyncSummary, SyncError> {
        let credentials = self.tokens.ensure_access_token(db, &site.id, force_refresh).await?;
        let api_host = site.api_host.as_deref().unwrap_or(&self.config.api_host);
        let api = ApiClient::new(self.http.clone(), api_host, &credentials.access_token);

        let base_body = json!({
            "dir": "ASC",
            "filter": { "since": from.to_rfc3339(), "to": to.to_rfc3339() },
            "with": { "analytics_data": true, "financial_data": true }
        });

        let mut summary = SyncSummary::default();
        let mut mapped: Vec<MappedOrder> = Vec::new();

        let (fbs, fbo) = tokio::join!(
            api.fetch_postings(FBS_ENDPOINT, &base_body),
            api.fetch_postings(FBO_ENDPOINT, &base_body),
        );
        for (endpoint, outcome) in [(FBS_ENDPOINT, fbs), (FBO_ENDPOINT, fbo)] {
            self.collect_endpoint(site, endpoint, outcome, &mut summary, &mut mapped)?;
        }

        if let Some(err) = combined_fetch_failure(&summary) {
            return Err(err);
        }

        let mut merged = aggregate_mapped(mapped);
        tracing::info!(
            "site {}: fetched {} postings, {} canonical orders",
            site.id,
            summary.fetched,
            merged.len()
        );

        let skus: Vec<String> = merged
            .iter()
            .flat_map(|order| order.items.iter().map(|item| item.sku.clone()))
            .collect();
        let metadata = self.metadata.load_metadata(db, Some(&api), &skus).await;
        for order in &mut merged {
            apply_metadata_to_items(&mut order.items, &metadata);
        }

        summary.persisted = self.persist_orders(db, &merged).await?;
        Ok(summary)
    }

    fn collect_endpoint(
        &self,
        site: &ResolvedSite,
        endpoint: PostingEndpoint,
        outcome: Result<Vec<Value>, SyncError>,
        summary: &mut SyncSummary,
        mapped: &mut Vec<MappedOrder>,
    ) -> Result<(), SyncError> {
        match outcome {
            Ok(postings) => {
                summary.fetched += postings.len();
                summary.endpoints.insert(endpoint.name.to_string(), postings.len());
                mapped.extend(
                    postings
                        .iter()
                        .filter_map(|raw| map_posting_to_order(raw, &site.id, endpoint.name)),
                );
                Ok(())
            }
            Err(err) if endpoint.optional => {
                tracing::warn!("{} fetch degraded for site {}: {}", endpoint.name, site.id, err);
                summary.endpoints.insert(endpoint.name.to_string(), 0);
                let status = match &err {
                    SyncError::EndpointFetchFailed { status, .. } => *status,
                    _ => None,
                };
                summary.errors.push(EndpointFailure {
                    endpoint: endpoint.name.to_string(),
                    status,
                    message: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Upsert orders on order_no, then replace each upserted order's items
    /// wholesale. Delete+insert keeps items exactly mirroring the latest
    /// source data.
    async fn persist_orders(
        &self,
        db: &DatabaseConnection,
        merged: &[MappedOrder],
    ) -> Result<usize, SyncError> {
        if merged.is_empty() {
            return Ok(0);
        }

        let order_models: Vec<orders::ActiveModel> = merged
            .iter()
            .map(|mapped| {
                let order = &mapped.order;
                orders::ActiveModel {
                    order_no: Set(order.order_no.clone()),
                    site_id: Set(order.site_id.clone()),
                    platform: Set(self.config.platform.clone()),
                    channel: Set(Some(order.channel.clone())),
                    status: Set(order.status.as_str().to_string()),
                    settlement_status: Set(order.settlement_status.as_str().to_string()),
                    settlement_date: Set(order.settlement_date.map(|dt| dt.date_naive())),
                    placed_at: Set(order.placed_at.fixed_offset()),
                    currency: Set(order.currency.clone()),
                    subtotal: Set(to_decimal(order.subtotal)),
                    discount: Set(to_decimal(order.discount)),
                    shipping_fee: Set(to_decimal(order.shipping_fee)),
                    tax: Set(to_decimal(order.tax)),
                    total: Set(to_decimal(order.total)),
                    cost_of_goods: Set(to_decimal(order.cost_of_goods)),
                    logistics_cost: Set(to_decimal(order.logistics_cost)),
                    remark: Set(Some(order.remark.clone())),
                    ..Default::default()
                }
            })
            .collect();

        Orders::insert_many(order_models)
            .on_conflict(
                OnConflict::column(orders::Column::OrderNo)
                    .update_columns([
                        orders::Column::SiteId,
                        orders::Column::Channel,
                        orders::Column::Status,
                        orders::Column::SettlementStatus,
                        orders::Column::SettlementDate,
                        orders::Column::PlacedAt,
                        orders::Column::Currency,
                        orders::Column::Subtotal,
                        orders::Column::Discount,
                        orders::Column::ShippingFee,
                        orders::Column::Tax,
                        orders::Column::Total,
                        orders::Column::CostOfGoods,
                        orders::Column::LogisticsCost,
                        orders::Column::Remark,
                    ])
                    .to_owned(),
            )
            .exec(db)
            .await?;

        let order_nos: Vec<String> = merged.iter().map(|m| m.order.order_no.clone()).collect();
        let persisted = Orders::find()
            .filter(orders::Column::OrderNo.is_in(order_nos))
            .all(db)
            .await?;
        let id_by_order_no: HashMap<String, i32> = persisted
            .into_iter()
            .map(|row| (row.order_no, row.id))
            .collect();

        let order_ids: Vec<i32> = id_by_order_no.values().copied().collect();
        OrderItems::delete_many()
            .filter(order_items::Column::OrderId.is_in(order_ids))
            .exec(db)
            .await?;

        let item_models: Vec<order_items::ActiveModel> = merged
            .iter()
            .filter_map(|mapped| {
                id_by_order_no
                    .get(&mapped.order.order_no)
                    .map(|&order_id| (order_id, mapped))
            })
            .flat_map(|(order_id, mapped)| {
                mapped.items.iter().map(move |item| order_items::ActiveModel {
                    order_id: Set(order_id),
                    sku: Set(item.sku.clone()),
                    product_name: Set(item_name_or_placeholder(item)),
                    quantity: Set(item.quantity as i32),
                    unit_price: Set(to_decimal(item.unit_price)),
                    total_price: Set(to_decimal(item.unit_price * item.quantity as f64)),
                    cost_price: Set(item.cost_price.map(to_decimal)),
                    product_image: Set(item.image.clone()),
                    ..Default::default()
                })
            })
            .collect();
        if !item_models.is_empty() {
            OrderItems::insert_many(item_models).exec(db).await?;
        }

        Ok(merged.len())
    }

    /// Read the persisted window back, newest first, items grouped per order.
    async fn query_orders(
        &self,
        db: &DatabaseConnection,
        site: &ResolvedSite,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OrderView>, SyncError> {
        let order_rows = Orders::find()
            .filter(orders::Column::SiteId.eq(&site.id))
            .filter(orders::Column::Platform.eq(&self.config.platform))
            .filter(orders::Column::PlacedAt.gte(from))
            .filter(orders::Column::PlacedAt.lte(to))
            .order_by_desc(orders::Column::PlacedAt)
            .limit(limit)
            .all(db)
            .await?;

        let order_ids: Vec<i32> = order_rows.iter().map(|row| row.id).collect();
        let mut items_by_order: HashMap<i32, Vec<order_items::Model>> = HashMap::new();
        if !order_ids.is_empty() {
            let item_rows = OrderItems::find()
                .filter(order_items::Column::OrderId.is_in(order_ids))
                .all(db)
                .await?;
            for item in item_rows {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let mut views: Vec<OrderView> = order_rows
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderView::from_models(order, items)
            })
            .collect();
        self.enrich_views(db, &mut views).await;
        Ok(views)
    }

    /// Fill missing item images from cache+catalog metadata. The provider is
    /// never contacted here, so read-back-only callers stay offline.
    async fn enrich_views(&self, db: &DatabaseConnection, views: &mut [OrderView]) {
        let skus: Vec<String> = views
            .iter()
            .flat_map(|view| view.items.iter())
            .filter(|item| item.image.is_none())
            .map(|item| item.sku.clone())
            .collect();
        if skus.is_empty() {
            return;
        }
        let metadata = self.metadata.load_metadata(db, None, &skus).await;
        for view in views {
            for item in &mut view.items {
                if item.image.is_none() {
                    item.image = metadata.get(&item.sku).and_then(|meta| meta.image.clone());
                }
            }
        }
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(2))
        .unwrap_or_default()
}

/// A sync with nothing but failed endpoints aborts with one combined error;
/// any endpoint that succeeded keeps the sync alive.
fn combined_fetch_failure(summary: &SyncSummary) -> Option<SyncError> {
    if summary.errors.is_empty() || summary.errors.len() != summary.endpoints.len() {
        return None;
    }
    let combined = summary
        .errors
        .iter()
        .map(|failure| format!("{}: {}", failure.endpoint, failure.message))
        .collect::<Vec<_>>()
        .join("; ");
    Some(SyncError::EndpointFetchFailed {
        endpoint: "all".to_string(),
        status: None,
        message: combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_service() -> OrderSyncService {
        let config = MarketplaceConfig {
            platform: "marketplace".to_string(),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            auth_host: "http://localhost:9".to_string(),
            api_host: "http://localhost:9".to_string(),
        };
        let http = Client::new();
        let tokens = TokenService::new(http.clone(), config.clone());
        OrderSyncService::new(config, http, tokens, ProductMetadataService::new())
    }

    fn test_site() -> ResolvedSite {
        ResolvedSite {
            id: "site-1".to_string(),
            platform: "marketplace".to_string(),
            api_host: None,
        }
    }

    fn fetch_error(endpoint: &str, status: u16) -> SyncError {
        SyncError::EndpointFetchFailed {
            endpoint: endpoint.to_string(),
            status: Some(status),
            message: "upstream unavailable".to_string(),
        }
    }

    #[test]
    fn optional_endpoint_failure_degrades_with_recorded_error() {
        let service = test_service();
        let site = test_site();
        let mut summary = SyncSummary::default();
        let mut mapped = Vec::new();

        let postings = vec![json!({
            "posting_number": "P-1",
            "financial_data": { "products": [{ "offer_id": "A", "price": 10 }] }
        })];
        service
            .collect_endpoint(&site, FBS_ENDPOINT, Ok(postings), &mut summary, &mut mapped)
            .unwrap();
        service
            .collect_endpoint(&site, FBO_ENDPOINT, Err(fetch_error("fbo", 503)), &mut summary, &mut mapped)
            .unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(mapped.len(), 1);
        // Failed channel counts as zero instead of aborting
        assert_eq!(summary.endpoints["fbs"], 1);
        assert_eq!(summary.endpoints["fbo"], 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].endpoint, "fbo");
        assert_eq!(summary.errors[0].status, Some(503));
        assert!(combined_fetch_failure(&summary).is_none());
    }

    #[test]
    fn all_endpoints_failing_aborts_with_combined_message() {
        let service = test_service();
        let site = test_site();
        let mut summary = SyncSummary::default();
        let mut mapped = Vec::new();

        service
            .collect_endpoint(&site, FBS_ENDPOINT, Err(fetch_error("fbs", 500)), &mut summary, &mut mapped)
            .unwrap();
        service
            .collect_endpoint(&site, FBO_ENDPOINT, Err(fetch_error("fbo", 503)), &mut summary, &mut mapped)
            .unwrap();

        assert!(mapped.is_empty());
        let err = combined_fetch_failure(&summary).unwrap();
        match err {
            SyncError::EndpointFetchFailed { endpoint, status, message } => {
                assert_eq!(endpoint, "all");
                assert_eq!(status, None);
                assert!(message.contains("fbs"));
                assert!(message.contains("fbo"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mandatory_endpoint_failure_aborts_immediately() {
        let service = test_service();
        let site = test_site();
        let mut summary = SyncSummary::default();
        let mut mapped = Vec::new();

        let mandatory = PostingEndpoint {
            name: "fbs",
            path: "/v3/posting/fbs/list",
            optional: false,
        };
        let outcome = service.collect_endpoint(
            &site,
            mandatory,
            Err(fetch_error("fbs", 500)),
            &mut summary,
            &mut mapped,
        );
        assert!(outcome.is_err());
        assert!(summary.errors.is_empty());
    }
}
