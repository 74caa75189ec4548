//! Batched product metadata lookup with an in-process cache.
//!
//! Resolution order per SKU: cache, then the local product_catalog table,
//! then the provider product-info API for whatever is still unresolved.
//! Metadata is cosmetic; every failure here degrades to "no enrichment"
//! rather than failing the sync that requested it.

use moka::future::Cache;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::entities::{prelude::*, product_catalog};
use crate::services::posting_mapper::ItemRecord;
use crate::services::provider_api::ApiClient;
use crate::services::value_utils::{string_at, value_at};

const CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const CACHE_CAPACITY: u64 = 10_000;
const LOOKUP_CHUNK: usize = 100;
const PRODUCT_INFO_PATH: &str = "/v2/product/info/list";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductMetadata {
    pub name: Option<String>,
    pub image: Option<String>,
    pub model: Option<String>,
}

impl ProductMetadata {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.image.is_none() && self.model.is_none()
    }

    /// Fill the gaps in `self` from another source without overwriting
    /// anything already resolved.
    fn merge_gaps(&mut self, other: ProductMetadata) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.image.is_none() {
            self.image = other.image;
        }
        if self.model.is_none() {
            self.model = other.model;
        }
    }
}

#[derive(Clone)]
pub struct ProductMetadataService {
    cache: Cache<String, ProductMetadata>,
}

impl Default for ProductMetadataService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductMetadataService {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Resolve metadata for a SKU set. `api` is the optional provider
    /// fallback; read-back-only callers pass `None` and get cache+catalog
    /// resolution only.
    pub async fn load_metadata(
        &self,
        db: &DatabaseConnection,
        api: Option<&ApiClient>,
        skus: &[String],
    ) -> HashMap<String, ProductMetadata> {
        let mut resolved: HashMap<String, ProductMetadata> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for sku in skus {
            let sku = sku.trim();
            if sku.is_empty() || resolved.contains_key(sku) {
                continue;
            }
            match self.cache.get(sku).await {
                Some(meta) => {
                    resolved.insert(sku.to_string(), meta);
                }
                None => {
                    if !missing.iter().any(|m| m == sku) {
                        missing.push(sku.to_string());
                    }
                }
            }
        }
        if missing.is_empty() {
            return resolved;
        }

        let mut found = self.fetch_from_catalog(db, &missing).await;

        let unresolved: Vec<String> = missing
            .iter()
            .filter(|sku| !found.contains_key(*sku))
            .cloned()
            .collect();
        if let (Some(api), false) = (api, unresolved.is_empty()) {
            for (sku, meta) in self.fetch_from_api(api, &unresolved).await {
                found.entry(sku).or_default().merge_gaps(meta);
            }
        }

        for (sku, meta) in found {
            if meta.is_empty() {
                continue;
            }
            self.cache.insert(sku.clone(), meta.clone()).await;
            resolved.insert(sku, meta);
        }
        resolved
    }

    async fn fetch_from_catalog(
        &self,
        db: &DatabaseConnection,
        skus: &[String],
    ) -> HashMap<String, ProductMetadata> {
        let mut found = HashMap::new();
        for chunk in skus.chunks(LOOKUP_CHUNK) {
            let rows = ProductCatalog::find()
                .filter(product_catalog::Column::Sku.is_in(chunk.to_vec()))
                .all(db)
                .await;
            let rows = match rows {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::warn!("product catalog lookup failed: {err}");
                    continue;
                }
            };
            for row in rows {
                found.insert(
                    row.sku.clone(),
                    ProductMetadata {
                        name: non_blank(row.name),
                        image: non_blank(row.image),
                        model: non_blank(row.model),
                    },
                );
            }
        }
        found
    }

    async fn fetch_from_api(
        &self,
        api: &ApiClient,
        skus: &[String],
    ) -> HashMap<String, ProductMetadata> {
        let mut found = HashMap::new();
        for chunk in skus.chunks(LOOKUP_CHUNK) {
            let body = json!({ "offer_id": chunk });
            let payload = match api.call_api("product-info", PRODUCT_INFO_PATH, &body).await {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!("product info lookup failed, continuing without: {err}");
                    continue;
                }
            };
            for entry in product_entries(&payload) {
                let Some(sku) = string_at(&entry, &["offer_id"])
                    .or_else(|| string_at(&entry, &["sku"]))
                else {
                    continue;
                };
                found.insert(
                    sku,
                    ProductMetadata {
                        name: string_at(&entry, &["name"]),
                        image: extract_primary_image(&entry),
                        model: string_at(&entry, &["model"])
                            .or_else(|| string_at(&entry, &["barcode"])),
                    },
                );
            }
        }
        found
    }
}

/// Pull the item list out of a product-info payload, tolerating the same
/// result/items nesting variants the posting endpoints use.
fn product_entries(payload: &Value) -> Vec<Value> {
    let result = payload.get("result").unwrap_or(payload);
    result
        .get("items")
        .or_else(|| result.get("products"))
        .unwrap_or(result)
        .as_array()
        .cloned()
        .unwrap_or_default()
}

fn extract_primary_image(entry: &Value) -> Option<String> {
    if let Some(primary) = string_at(entry, &["primary_image"]) {
        return Some(primary);
    }
    value_at(entry, &["images"])
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Fill missing item names and images from resolved metadata. An existing
/// non-blank name is kept as-is; the final fallback chain ends at the SKU
/// and then a literal placeholder, so display names are never empty.
pub fn apply_metadata_to_items(
    items: &mut [ItemRecord],
    metadata: &HashMap<String, ProductMetadata>,
) {
    for item in items {
        let meta = metadata.get(&item.sku);
        let existing = item
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        item.product_name = existing
            .or_else(|| meta.and_then(|m| m.name.clone()))
            .or_else(|| {
                let sku = item.sku.trim();
                (!sku.is_empty()).then(|| sku.to_string())
            })
            .or_else(|| Some("item".to_string()));
        if item.image.is_none() {
            item.image = meta.and_then(|m| m.image.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, image: Option<&str>) -> ProductMetadata {
        ProductMetadata {
            name: Some(name.to_string()),
            image: image.map(str::to_string),
            model: None,
        }
    }

    fn item(sku: &str, name: Option<&str>) -> ItemRecord {
        ItemRecord {
            sku: sku.to_string(),
            product_name: name.map(str::to_string),
            quantity: 1,
            unit_price: 1.0,
            discount: 0.0,
            tax: 0.0,
            cost_price: None,
            image: None,
        }
    }

    #[test]
    fn existing_names_are_never_overwritten() {
        let mut items = vec![item("A", Some("Original name"))];
        let metadata = HashMap::from([("A".to_string(), meta("Catalog name", None))]);
        apply_metadata_to_items(&mut items, &metadata);
        assert_eq!(items[0].product_name.as_deref(), Some("Original name"));
    }

    #[test]
    fn blank_names_fall_back_to_metadata_then_sku() {
        let mut items = vec![item("A", Some("  ")), item("B", None), item("", None)];
        let metadata = HashMap::from([("A".to_string(), meta("Desk lamp", Some("img.jpg")))]);
        apply_metadata_to_items(&mut items, &metadata);
        assert_eq!(items[0].product_name.as_deref(), Some("Desk lamp"));
        assert_eq!(items[0].image.as_deref(), Some("img.jpg"));
        assert_eq!(items[1].product_name.as_deref(), Some("B"));
        assert_eq!(items[2].product_name.as_deref(), Some("item"));
    }

    #[test]
    fn merge_fills_gaps_without_overwriting() {
        let mut catalog = ProductMetadata {
            name: Some("Catalog".into()),
            image: None,
            model: None,
        };
        catalog.merge_gaps(ProductMetadata {
            name: Some("API".into()),
            image: Some("api.jpg".into()),
            model: Some("M-1".into()),
        });
        assert_eq!(catalog.name.as_deref(), Some("Catalog"));
        assert_eq!(catalog.image.as_deref(), Some("api.jpg"));
        assert_eq!(catalog.model.as_deref(), Some("M-1"));
    }

    #[test]
    fn primary_image_prefers_explicit_field() {
        let entry = serde_json::json!({
            "primary_image": "main.jpg",
            "images": ["first.jpg", "second.jpg"]
        });
        assert_eq!(extract_primary_image(&entry).as_deref(), Some("main.jpg"));

        let list_only = serde_json::json!({ "images": ["first.jpg"] });
        assert_eq!(extract_primary_image(&list_only).as_deref(), Some("first.jpg"));
        assert_eq!(extract_primary_image(&serde_json::json!({})), None);
    }

    #[tokio::test]
    async fn cache_hits_short_circuit_lookups() {
        let service = ProductMetadataService::with_ttl(Duration::from_secs(60));
        service.cache.insert("A".to_string(), meta("Cached", None)).await;
        // A database the service never reaches: resolution comes from cache
        let db = sea_orm::DatabaseConnection::Disconnected;
        let resolved = service.load_metadata(&db, None, &["A".to_string()]).await;
        assert_eq!(resolved["A"].name.as_deref(), Some("Cached"));
    }
}
