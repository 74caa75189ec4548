//! Site alias resolution.
//!
//! Callers address a site by id, name, or display name, in human-friendly
//! spelling. Resolution tries an ordered list of candidate forms against the
//! site_configs table (then the legacy sites table) and the first match wins.

use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::{prelude::*, site_configs, sites};
use crate::error::SyncError;

/// The resolved identity a sync runs under.
#[derive(Debug, Clone)]
pub struct ResolvedSite {
    pub id: String,
    pub platform: String,
    pub api_host: Option<String>,
}

/// Candidate lookup forms for an alias: the exact input, a slug (lowercase,
/// runs of non-alphanumerics collapsed to underscores), and the slug with a
/// platform prefix. Duplicates are dropped while preserving order.
pub fn candidate_forms(input: &str, platform: &str) -> Vec<String> {
    let exact = input.trim().to_string();
    let slug = slugify(&exact);
    let prefixed = format!("{}_{}", platform, slug);

    let mut forms = Vec::new();
    for form in [exact, slug, prefixed] {
        if !form.is_empty() && !forms.contains(&form) {
            forms.push(form);
        }
    }
    forms
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_sep = true;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Resolve an alias to a site, restricted to the configured platform.
/// Failure reports every candidate form tried.
pub async fn resolve_site(
    db: &DatabaseConnection,
    input: &str,
    platform: &str,
) -> Result<ResolvedSite, SyncError> {
    let candidates = candidate_forms(input, platform);

    for candidate in &candidates {
        let config = SiteConfigs::find()
            .filter(
                Condition::any()
                    .add(site_configs::Column::Id.eq(candidate))
                    .add(site_configs::Column::Name.eq(candidate))
                    .add(site_configs::Column::DisplayName.eq(candidate)),
            )
            .filter(site_configs::Column::Platform.eq(platform))
            .one(db)
            .await?;
        if let Some(config) = config {
            return Ok(ResolvedSite {
                id: config.id,
                platform: config.platform,
                api_host: config.api_host,
            });
        }

        let site = Sites::find()
            .filter(
                Condition::any()
                    .add(sites::Column::Id.eq(candidate))
                    .add(sites::Column::Name.eq(candidate)),
            )
            .filter(sites::Column::Platform.eq(platform))
            .one(db)
            .await?;
        if let Some(site) = site {
            return Ok(ResolvedSite {
                id: site.id,
                platform: site.platform,
                api_host: None,
            });
        }
    }

    Err(SyncError::SiteNotFound {
        input: input.to_string(),
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_cover_exact_slug_and_prefixed_forms() {
        let forms = candidate_forms("My Shop (EU)", "marketplace");
        assert_eq!(
            forms,
            vec![
                "My Shop (EU)".to_string(),
                "my_shop_eu".to_string(),
                "marketplace_my_shop_eu".to_string(),
            ]
        );
    }

    #[test]
    fn already_normalized_input_does_not_duplicate() {
        let forms = candidate_forms("my_shop", "marketplace");
        assert_eq!(forms, vec!["my_shop".to_string(), "marketplace_my_shop".to_string()]);
    }

    #[test]
    fn slug_collapses_separator_runs() {
        assert_eq!(slugify("  Store -- #1  "), "store_1");
        assert_eq!(slugify("ABC"), "abc");
        assert_eq!(slugify("---"), "");
    }
}
