//! Authenticated HTTP client for the marketplace seller API.
//!
//! Responses are parsed text-first: the body is read as a string and only
//! then interpreted as JSON, so HTML error pages and log-polluted payloads
//! produce a diagnosable error (or a salvaged JSON segment) instead of a
//! deserializer panic deep inside reqwest.

use reqwest::Client;
use serde_json::Value;

use crate::error::SyncError;
use crate::services::value_utils::to_number;

const PAGE_SIZE: u64 = 100;
const MAX_POSTINGS: usize = 5000;
const SNIPPET_LIMIT: usize = 160;

/// A posting list endpoint. Optional endpoints degrade to a recorded failure
/// when they error; a mandatory endpoint aborts the whole sync.
#[derive(Debug, Clone, Copy)]
pub struct PostingEndpoint {
    pub name: &'static str,
    pub path: &'static str,
    pub optional: bool,
}

pub const FBS_ENDPOINT: PostingEndpoint = PostingEndpoint {
    name: "fbs",
    path: "/v3/posting/fbs/list",
    optional: true,
};

pub const FBO_ENDPOINT: PostingEndpoint = PostingEndpoint {
    name: "fbo",
    path: "/v2/posting/fbo/list",
    optional: true,
};

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_host: String,
    access_token: String,
}

impl ApiClient {
    pub fn new(client: Client, api_host: &str, access_token: &str) -> Self {
        Self {
            client,
            api_host: api_host.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// POST a JSON body to an API path and return the parsed payload.
    ///
    /// Provider-level failures (non-2xx status, `success: false`, or a
    /// non-zero `code`) become [`SyncError::EndpointFetchFailed`] carrying
    /// the provider's own message when one is present.
    pub async fn call_api(&self, endpoint: &str, path: &str, body: &Value) -> Result<Value, SyncError> {
        let url = format!("{}{}", self.api_host, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let payload = parse_provider_response(endpoint, &text)?;

        if !status.is_success() {
            return Err(SyncError::EndpointFetchFailed {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message: provider_message(&payload)
                    .unwrap_or_else(|| format!("request returned HTTP {}", status.as_u16())),
            });
        }

        if let Some(message) = provider_failure(&payload) {
            return Err(SyncError::EndpointFetchFailed {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(payload)
    }

    /// Fetch every posting in the window from one endpoint, walking offset
    /// pagination until a short page or the hard cap.
    pub async fn fetch_postings(
        &self,
        endpoint: PostingEndpoint,
        base_body: &Value,
    ) -> Result<Vec<Value>, SyncError> {
        let mut postings: Vec<Value> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut body = base_body.clone();
            if let Some(map) = body.as_object_mut() {
                map.insert("limit".to_string(), Value::from(PAGE_SIZE));
                map.insert("offset".to_string(), Value::from(offset));
            }

            let payload = self.call_api(endpoint.name, endpoint.path, &body).await?;
            let chunk = extract_posting_chunk(&payload);
            let received = chunk.len();
            postings.extend(chunk);

            tracing::debug!(
                "{}: page offset={} received={} total={}",
                endpoint.name,
                offset,
                received,
                postings.len()
            );

            if received < PAGE_SIZE as usize || postings.len() >= MAX_POSTINGS {
                if postings.len() >= MAX_POSTINGS {
                    tracing::warn!(
                        "{}: hit the {} posting cap, window may be truncated",
                        endpoint.name,
                        MAX_POSTINGS
                    );
                    postings.truncate(MAX_POSTINGS);
                }
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(postings)
    }
}

/// Parse a response body as JSON, salvaging an embedded object or array when
/// the payload is wrapped in log noise. Unsalvageable bodies yield a parse
/// error carrying a sanitized snippet.
pub fn parse_provider_response(endpoint: &str, text: &str) -> Result<Value, SyncError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    if let Some(segment) = extract_json_segment(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&segment) {
            tracing::warn!("{}: salvaged JSON segment from a polluted response body", endpoint);
            return Ok(value);
        }
    }
    Err(SyncError::ResponseParseFailed {
        endpoint: endpoint.to_string(),
        snippet: sanitize_snippet(text),
    })
}

/// Scan for the first balanced `{…}` or `[…]` in a string, tracking string
/// literals and escapes so braces inside values do not break the balance.
pub fn extract_json_segment(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Collapse whitespace and cap the length so raw provider bodies stay
/// readable (and log-safe) inside error messages.
pub fn sanitize_snippet(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "<empty body>".to_string();
    }
    if collapsed.chars().count() <= SNIPPET_LIMIT {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(SNIPPET_LIMIT).collect();
    format!("{cut}…")
}

/// The posting array may appear at `result.postings`, `result.items`, or as
/// `result` directly depending on the endpoint generation.
fn extract_posting_chunk(payload: &Value) -> Vec<Value> {
    let result = payload.get("result").unwrap_or(payload);
    let list = result
        .get("postings")
        .or_else(|| result.get("items"))
        .unwrap_or(result);
    list.as_array().cloned().unwrap_or_default()
}

fn provider_failure(payload: &Value) -> Option<String> {
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        return Some(provider_message(payload).unwrap_or_else(|| "provider reported success=false".to_string()));
    }
    if let Some(code) = payload.get("code").and_then(to_number) {
        if code != 0.0 {
            return Some(
                provider_message(payload).unwrap_or_else(|| format!("provider returned code {code}")),
            );
        }
    }
    None
}

fn provider_message(payload: &Value) -> Option<String> {
    for key in ["message", "error", "error_description"] {
        if let Some(message) = payload.get(key).and_then(Value::as_str) {
            if !message.trim().is_empty() {
                return Some(message.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_object_from_log_polluted_body() {
        let body = "WARN slow upstream\n{\"result\": {\"postings\": []}}\ntrailing";
        let segment = extract_json_segment(body).unwrap();
        assert_eq!(segment, "{\"result\": {\"postings\": []}}");
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance_the_scan() {
        let body = "noise {\"note\": \"open { and \\\" close }\", \"ok\": 1} tail";
        let segment = extract_json_segment(body).unwrap();
        let value: Value = serde_json::from_str(&segment).unwrap();
        assert_eq!(value["ok"], 1);
    }

    #[test]
    fn array_payloads_are_salvaged_too() {
        let body = "prefix [1, {\"a\": \"]\"}, 3] suffix";
        let segment = extract_json_segment(body).unwrap();
        let value: Value = serde_json::from_str(&segment).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn unsalvageable_body_yields_snippet_error() {
        let err = parse_provider_response("fbs", "<html><body>502 Bad Gateway</body></html>")
            .unwrap_err();
        match err {
            SyncError::ResponseParseFailed { endpoint, snippet } => {
                assert_eq!(endpoint, "fbs");
                assert!(snippet.contains("502 Bad Gateway"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn snippet_is_capped_and_whitespace_collapsed() {
        let long = format!("line one\n\t line   two {}", "x".repeat(400));
        let snippet = sanitize_snippet(&long);
        assert!(snippet.starts_with("line one line two"));
        assert!(snippet.chars().count() <= SNIPPET_LIMIT + 1);
        assert!(snippet.ends_with('…'));
        assert_eq!(sanitize_snippet("   "), "<empty body>");
    }

    #[test]
    fn posting_chunk_is_found_under_any_known_shape() {
        let nested = json!({ "result": { "postings": [{"id": 1}] } });
        assert_eq!(extract_posting_chunk(&nested).len(), 1);

        let items = json!({ "result": { "items": [{"id": 1}, {"id": 2}] } });
        assert_eq!(extract_posting_chunk(&items).len(), 2);

        let flat = json!({ "result": [{"id": 1}] });
        assert_eq!(extract_posting_chunk(&flat).len(), 1);

        assert!(extract_posting_chunk(&json!({ "result": {} })).is_empty());
    }

    #[test]
    fn provider_level_failures_are_detected() {
        assert!(provider_failure(&json!({ "success": false, "message": "quota" }))
            .unwrap()
            .contains("quota"));
        assert!(provider_failure(&json!({ "code": 7, "error": "bad filter" })).is_some());
        assert!(provider_failure(&json!({ "code": 0, "result": [] })).is_none());
        assert!(provider_failure(&json!({ "success": true })).is_none());
    }
}
