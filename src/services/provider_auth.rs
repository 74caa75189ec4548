//! Credential storage and refresh against the marketplace auth endpoint.
//!
//! One credential row exists per (site_id, provider); this service is the
//! only writer. A token is considered usable while it is more than the
//! clock-skew margin away from expiry, so a credential is never presented
//! right up to its last valid moment.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::entities::{integration_tokens, prelude::*};
use crate::error::SyncError;
use crate::MarketplaceConfig;

const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh";
const CLOCK_SKEW_MINUTES: i64 = 5;

/// The live access credential handed to API callers.
#[derive(Debug, Clone)]
pub struct AccessCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RefreshedToken {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
    raw: Value,
}

#[derive(Clone)]
pub struct TokenService {
    client: Client,
    config: MarketplaceConfig,
}

impl TokenService {
    pub fn new(client: Client, config: MarketplaceConfig) -> Self {
        Self { client, config }
    }

    /// Return a usable access token for the site, refreshing it first when
    /// stale. Absence of a credential (or an empty refresh token) is fatal;
    /// the caller must re-run the authorization flow.
    pub async fn ensure_access_token(
        &self,
        db: &DatabaseConnection,
        site_id: &str,
        force_refresh: bool,
    ) -> Result<AccessCredentials, SyncError> {
        let record = IntegrationTokens::find()
            .filter(integration_tokens::Column::SiteId.eq(site_id))
            .filter(integration_tokens::Column::Provider.eq(&self.config.platform))
            .one(db)
            .await?;

        let record = record
            .filter(|row| !row.refresh_token.trim().is_empty())
            .ok_or_else(|| SyncError::TokenNotFound {
                site_id: site_id.to_string(),
                provider: self.config.platform.clone(),
            })?;

        let expires_at = record.expires_at.map(|dt| dt.with_timezone(&Utc));
        if !force_refresh && credential_is_usable(&record.access_token, expires_at, Utc::now()) {
            return Ok(AccessCredentials {
                access_token: record.access_token.unwrap_or_default(),
                refresh_token: record.refresh_token,
                expires_at,
            });
        }

        tracing::info!("Refreshing {} access token for site {}", self.config.platform, site_id);
        let refreshed = self.refresh_access_token(&record.refresh_token).await?;
        self.store_credential(db, site_id, &refreshed).await?;

        Ok(AccessCredentials {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        })
    }

    /// Exchange a refresh token for a new access/refresh pair via the signed
    /// refresh endpoint. Failures carry the provider status and raw body.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken, SyncError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("app_key".into(), self.config.app_key.clone());
        params.insert("refresh_token".into(), refresh_token.to_string());
        params.insert("sign_method".into(), "sha256".into());
        params.insert("timestamp".into(), timestamp);
        let sign = build_signature(TOKEN_REFRESH_PATH, &params, &self.config.app_secret);
        params.insert("sign".into(), sign);

        let url = format!(
            "{}{}",
            self.config.auth_host.trim_end_matches('/'),
            TOKEN_REFRESH_PATH
        );
        let response = self.client.post(&url).query(&params).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let payload: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = payload
                .as_ref()
                .and_then(refresh_error_message)
                .unwrap_or_else(|| "failed to refresh access token".to_string());
            return Err(SyncError::TokenRefreshFailed {
                status: status.as_u16(),
                message,
                body: Some(text),
            });
        }

        let payload = payload.unwrap_or(Value::Null);
        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SyncError::TokenRefreshFailed {
                status: status.as_u16(),
                message: "refresh response did not include an access_token".to_string(),
                body: Some(text.clone()),
            })?;

        let new_refresh = payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| refresh_token.to_string());

        let expires_in = payload
            .get("expires_in")
            .or_else(|| payload.get("expire_in"))
            .and_then(super::value_utils::to_number)
            .filter(|secs| *secs > 0.0);
        let expires_at = expires_in.map(|secs| Utc::now() + Duration::seconds(secs as i64));

        Ok(RefreshedToken {
            access_token,
            refresh_token: new_refresh,
            expires_at,
            raw: payload,
        })
    }

    /// Upsert the credential row on (site_id, provider). The only mutation
    /// path for credentials; rows are superseded, never deleted.
    async fn store_credential(
        &self,
        db: &DatabaseConnection,
        site_id: &str,
        token: &RefreshedToken,
    ) -> Result<(), SyncError> {
        // Invariant: never persist an empty refresh token
        debug_assert!(!token.refresh_token.trim().is_empty());

        let model = integration_tokens::ActiveModel {
            site_id: Set(site_id.to_string()),
            provider: Set(self.config.platform.clone()),
            access_token: Set(Some(token.access_token.clone())),
            refresh_token: Set(token.refresh_token.clone()),
            expires_at: Set(token.expires_at.map(|dt| dt.fixed_offset())),
            meta: Set(Some(token.raw.clone())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        IntegrationTokens::insert(model)
            .on_conflict(
                OnConflict::columns([
                    integration_tokens::Column::SiteId,
                    integration_tokens::Column::Provider,
                ])
                .update_columns([
                    integration_tokens::Column::AccessToken,
                    integration_tokens::Column::RefreshToken,
                    integration_tokens::Column::ExpiresAt,
                    integration_tokens::Column::Meta,
                    integration_tokens::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(db)
            .await?;

        Ok(())
    }
}

/// A credential is usable when it has an access token and either no recorded
/// expiry or one further than the clock-skew margin in the future.
pub fn credential_is_usable(
    access_token: &Option<String>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let has_token = access_token
        .as_deref()
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    if !has_token {
        return false;
    }
    match expires_at {
        None => true,
        Some(expiry) => expiry - Duration::minutes(CLOCK_SKEW_MINUTES) > now,
    }
}

/// Canonical request signature: sorted keys concatenated as `path k1v1k2v2…`,
/// HMAC-SHA256 under the app secret, uppercase hex digest.
pub fn build_signature(path: &str, params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut base = String::from(path);
    for (key, value) in params {
        base.push_str(key);
        base.push_str(value);
    }
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    hex::encode(mac.finalize().into_bytes()).to_uppercase()
}

fn refresh_error_message(payload: &Value) -> Option<String> {
    for key in ["message", "error_description", "error"] {
        if let Some(message) = payload.get(key).and_then(Value::as_str) {
            if !message.trim().is_empty() {
                return Some(message.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_credential_is_returned_without_refresh() {
        let now = Utc::now();
        let access = Some("token".to_string());
        assert!(credential_is_usable(
            &access,
            Some(now + Duration::minutes(30)),
            now
        ));
    }

    #[test]
    fn credential_inside_skew_window_is_stale() {
        let now = Utc::now();
        let access = Some("token".to_string());
        // Expires in 4 minutes, inside the 5-minute margin
        assert!(!credential_is_usable(
            &access,
            Some(now + Duration::minutes(4)),
            now
        ));
        assert!(!credential_is_usable(
            &access,
            Some(now - Duration::minutes(1)),
            now
        ));
    }

    #[test]
    fn missing_access_token_is_never_usable() {
        let now = Utc::now();
        assert!(!credential_is_usable(&None, None, now));
        assert!(!credential_is_usable(&Some("  ".to_string()), None, now));
    }

    #[test]
    fn credential_without_expiry_is_usable() {
        let now = Utc::now();
        assert!(credential_is_usable(&Some("token".to_string()), None, now));
    }

    #[test]
    fn signature_is_uppercase_hex_over_sorted_params() {
        let mut params = BTreeMap::new();
        params.insert("timestamp".to_string(), "1700000000000".to_string());
        params.insert("app_key".to_string(), "key123".to_string());
        params.insert("refresh_token".to_string(), "rt-abc".to_string());

        let sign = build_signature("/auth/token/refresh", &params, "secret");
        assert_eq!(sign.len(), 64);
        assert!(sign.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        // Deterministic for identical input, sensitive to the secret
        assert_eq!(sign, build_signature("/auth/token/refresh", &params, "secret"));
        assert_ne!(sign, build_signature("/auth/token/refresh", &params, "other"));

        // Parameter order does not matter, only the sorted key set
        let mut reordered = BTreeMap::new();
        reordered.insert("refresh_token".to_string(), "rt-abc".to_string());
        reordered.insert("app_key".to_string(), "key123".to_string());
        reordered.insert("timestamp".to_string(), "1700000000000".to_string());
        assert_eq!(sign, build_signature("/auth/token/refresh", &reordered, "secret"));
    }
}
