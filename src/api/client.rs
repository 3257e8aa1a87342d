//! HTTP client for the Monitored Entities API v2.
//!
//! Implements cursor-based pagination, batch-by-id lookups, and exponential
//! backoff retry for rate limiting and transient errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::api::entity::{decode_entities, decode_entity, ServiceNode, SERVICE_TYPE};
use crate::api::{EntityGateway, EntityPage};
use crate::cancel::CancellationToken;
use crate::config::{Config, RetryConfig};
use crate::error::{Result, SvcTopoError};

/// Fields requested in BFS batch lookups: per-node properties plus the
/// outgoing-call relationship.
const BFS_FIELDS: &str = "+properties,+fromRelationships.calls";

/// Fields requested in full-scan pages: both relationship directions are
/// combined in one scan.
const SCAN_FIELDS: &str = "+properties,+fromRelationships.calls,+toRelationships.called_by";

/// Error response bodies are truncated to this length before surfacing.
const BODY_EXCERPT_LEN: usize = 500;

/// Backoff sleeps are sliced so a cancellation request interrupts a long
/// wait instead of blocking until the full interval elapses.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Outcome of a single request attempt, before retry policy is applied.
pub(crate) enum Attempt {
    /// HTTP 200 with a parsed JSON body
    Ok(serde_json::Value),
    /// 429, 5xx, connection failure, or timeout: retry with backoff
    Transient(String),
    /// Other 4xx or TLS failure: retrying cannot help
    Fatal(SvcTopoError),
}

/// Drive an attempt function through the retry/backoff state machine.
///
/// Cancellation is polled before every attempt and during every backoff
/// sleep. Transient failures are retried with exponential backoff
/// `min(initial * 2^k, max_backoff)`; once the count exceeds `max_retries`
/// the last failure escalates to [`SvcTopoError::Exhausted`].
pub(crate) async fn execute_with_retry<F, Fut>(
    mut attempt: F,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<serde_json::Value>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Attempt>,
{
    let mut retries = 0usize;
    let mut backoff = retry.initial_backoff();

    loop {
        if cancel.is_cancelled() {
            return Err(SvcTopoError::Cancelled);
        }

        match attempt().await {
            Attempt::Ok(body) => return Ok(body),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Transient(message) => {
                retries += 1;
                if retries > retry.max_retries {
                    return Err(SvcTopoError::Exhausted {
                        attempts: retries,
                        message,
                    });
                }
                log::warn!(
                    "Transient API error ({}). Retry {}/{} after {:.1}s",
                    message,
                    retries,
                    retry.max_retries,
                    backoff.as_secs_f64()
                );
                sleep_cancellable(backoff, cancel).await?;
                backoff = (backoff * 2).min(retry.max_backoff());
            }
        }
    }
}

/// Sleep for `duration`, waking early with `Cancelled` if the token is set.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return Err(SvcTopoError::Cancelled);
        }
        let slice = remaining.min(SLEEP_SLICE);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    if cancel.is_cancelled() {
        return Err(SvcTopoError::Cancelled);
    }
    Ok(())
}

/// Classify a reqwest transport error. TLS failures signal misconfiguration
/// (self-signed certs), not a transient condition, so they are never retried.
fn classify_transport_error(err: &reqwest::Error) -> Attempt {
    if is_tls_error(err) {
        return Attempt::Fatal(SvcTopoError::Tls(err.to_string()));
    }
    if err.is_connect() || err.is_timeout() {
        return Attempt::Transient(format!("connection error: {}", err));
    }
    Attempt::Fatal(SvcTopoError::Api {
        status: 0,
        message: format!("request failed: {}", err),
    })
}

fn is_tls_error(err: &reqwest::Error) -> bool {
    // reqwest does not expose a TLS discriminant; match on the error chain text
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let text = e.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = e.source();
    }
    false
}

fn truncate_body(body: &str) -> String {
    if body.is_empty() {
        return "No error details".to_string();
    }
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Parse a raw page body into an [`EntityPage`], tolerating malformed
/// individual records.
pub(crate) fn parse_page(body: &serde_json::Value) -> EntityPage {
    let entities = match body.get("entities") {
        Some(serde_json::Value::Array(items)) => decode_entities(items),
        Some(other) => {
            log::warn!(
                "Unexpected 'entities' payload type ({}), treating as empty",
                match other {
                    serde_json::Value::Object(_) => "object",
                    serde_json::Value::String(_) => "string",
                    _ => "non-array",
                }
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let next_page_key = body
        .get("nextPageKey")
        .and_then(|v| v.as_str())
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string());

    let total_count = body.get("totalCount").and_then(|v| v.as_u64());

    EntityPage {
        entities,
        next_page_key,
        total_count,
    }
}

/// HTTP gateway to one monitoring environment.
///
/// Owns the underlying connection pool for exactly one run; dropping the
/// client releases the pool on every exit path.
pub struct EntityClient {
    http: Client,
    base_url: String,
    page_size: usize,
    from_time: Option<String>,
    to_time: Option<String>,
    retry: RetryConfig,
}

impl EntityClient {
    /// Build a client from validated configuration. Reads the API token from
    /// the configured environment variable; the token is baked into the
    /// session headers and never logged.
    pub fn new(config: &Config) -> Result<Self> {
        let token = config
            .api_token()
            .map_err(|e| SvcTopoError::Config(e.to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Api-Token {}", token))
            .map_err(|_| SvcTopoError::Config("API token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        if !config.api.verify_ssl {
            log::warn!("SSL certificate verification is DISABLED");
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.api.verify_ssl)
            .build()
            .map_err(|e| SvcTopoError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            page_size: config.discovery.page_size,
            from_time: config.discovery.from_time.clone(),
            to_time: config.discovery.to_time.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Issue one GET with retry, returning the parsed JSON body.
    async fn get_json(
        &self,
        url: &str,
        params: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let http = &self.http;
        execute_with_retry(
            || {
                let request = if params.is_empty() {
                    http.get(url)
                } else {
                    http.get(url).query(&params)
                };
                async move {
                    match request.send().await {
                        Ok(response) => {
                            let status = response.status();
                            if status.is_success() {
                                match response.json::<serde_json::Value>().await {
                                    Ok(body) => Attempt::Ok(body),
                                    Err(e) => Attempt::Fatal(SvcTopoError::Decode(format!(
                                        "invalid JSON response: {}",
                                        e
                                    ))),
                                }
                            } else if status.as_u16() == 429 || status.is_server_error() {
                                Attempt::Transient(format!("HTTP {}", status.as_u16()))
                            } else {
                                let body = response.text().await.unwrap_or_default();
                                Attempt::Fatal(SvcTopoError::Api {
                                    status: status.as_u16(),
                                    message: truncate_body(&body),
                                })
                            }
                        }
                        Err(e) => classify_transport_error(&e),
                    }
                }
            },
            &self.retry,
            cancel,
        )
        .await
    }

    fn entities_url(&self) -> String {
        format!("{}/entities", self.base_url)
    }

    /// Minimal probe request; returns the total SERVICE entity count.
    pub async fn test_connection(&self, cancel: &CancellationToken) -> Result<u64> {
        let params = vec![
            (
                "entitySelector".to_string(),
                format!("type(\"{}\")", SERVICE_TYPE),
            ),
            ("pageSize".to_string(), "1".to_string()),
        ];
        let body = self.get_json(&self.entities_url(), params, cancel).await?;
        let page = parse_page(&body);
        Ok(page.total_count.unwrap_or(page.entities.len() as u64))
    }
}

#[async_trait]
impl EntityGateway for EntityClient {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<EntityPage> {
        // First page: all filter parameters. Continuation pages: ONLY the
        // cursor; the API rejects filters supplied alongside nextPageKey.
        let params = match cursor {
            Some(key) => vec![("nextPageKey".to_string(), key.to_string())],
            None => {
                let mut params = vec![
                    (
                        "entitySelector".to_string(),
                        format!("type(\"{}\")", SERVICE_TYPE),
                    ),
                    ("fields".to_string(), SCAN_FIELDS.to_string()),
                    ("pageSize".to_string(), self.page_size.to_string()),
                ];
                if let Some(from) = &self.from_time {
                    params.push(("from".to_string(), from.clone()));
                }
                if let Some(to) = &self.to_time {
                    params.push(("to".to_string(), to.clone()));
                }
                params
            }
        };

        let body = self.get_json(&self.entities_url(), params, cancel).await?;
        Ok(parse_page(&body))
    }

    async fn fetch_by_ids(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let quoted: Vec<String> = ids.iter().map(|id| format!("\"{}\"", id)).collect();
        let selector = format!(
            "type(\"{}\"),entityId({})",
            SERVICE_TYPE,
            quoted.join(",")
        );
        let params = vec![
            ("entitySelector".to_string(), selector),
            ("fields".to_string(), BFS_FIELDS.to_string()),
            ("pageSize".to_string(), ids.len().to_string()),
        ];

        let body = self.get_json(&self.entities_url(), params, cancel).await?;
        Ok(parse_page(&body).entities)
    }

    async fn fetch_by_id(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ServiceNode>> {
        let url = format!("{}/entities/{}", self.base_url, id);
        match self.get_json(&url, Vec::new(), cancel).await {
            Ok(body) => Ok(decode_entity(&body).ok()),
            Err(SvcTopoError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn retry_config(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_secs: 1.0,
            max_backoff_secs: 60.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        // 429 exactly max_retries times, then 200
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempt_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let a = attempts.clone();
        let t = attempt_times.clone();
        let result = execute_with_retry(
            move || {
                let n = a.fetch_add(1, Ordering::SeqCst);
                t.lock().unwrap().push(Instant::now());
                async move {
                    if n < 5 {
                        Attempt::Transient("HTTP 429".to_string())
                    } else {
                        Attempt::Ok(json!({"ok": true}))
                    }
                }
            },
            &retry_config(5),
            &cancel,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 6);

        // Measured backoff sequence follows min(1 * 2^k, 60)
        let times = attempt_times.lock().unwrap();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_caps_at_max() {
        let attempt_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let t = attempt_times.clone();
        let result = execute_with_retry(
            move || {
                t.lock().unwrap().push(Instant::now());
                async move { Attempt::Transient("HTTP 503".to_string()) }
            },
            &retry_config(8),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(SvcTopoError::Exhausted { .. })));
        let times = attempt_times.lock().unwrap();
        let gaps: Vec<u64> = times
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs())
            .collect();
        // Doubling capped at 60s
        assert_eq!(gaps, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_after_max_retries_plus_one_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let a = attempts.clone();
        let result = execute_with_retry(
            move || {
                a.fetch_add(1, Ordering::SeqCst);
                async move { Attempt::Transient("HTTP 429".to_string()) }
            },
            &retry_config(5),
            &cancel,
        )
        .await;

        match result {
            Err(SvcTopoError::Exhausted { attempts: n, .. }) => assert_eq!(n, 6),
            other => panic!("expected Exhausted, got {:?}", other.map(|_| ())),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fatal_error_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let a = attempts.clone();
        let result = execute_with_retry(
            move || {
                a.fetch_add(1, Ordering::SeqCst);
                async move {
                    Attempt::Fatal(SvcTopoError::Api {
                        status: 401,
                        message: "unauthorized".to_string(),
                    })
                }
            },
            &retry_config(5),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(SvcTopoError::Api { status: 401, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_checks_cancellation_before_first_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let a = attempts.clone();
        let result = execute_with_retry(
            move || {
                a.fetch_add(1, Ordering::SeqCst);
                async move { Attempt::Ok(json!({})) }
            },
            &retry_config(5),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(SvcTopoError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancellation_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();

        // First attempt fails transiently and sets the flag; the backoff
        // sleep must notice instead of waiting the full interval.
        let c = cancel.clone();
        let result = execute_with_retry(
            move || {
                c.cancel();
                async move { Attempt::Transient("HTTP 500".to_string()) }
            },
            &retry_config(5),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(SvcTopoError::Cancelled)));
    }

    #[test]
    fn test_parse_page_entities_and_cursor() {
        let page = parse_page(&json!({
            "entities": [
                {"entityId": "SERVICE-A", "displayName": "a"},
                {"entityId": "SERVICE-B", "displayName": "b"}
            ],
            "nextPageKey": "AQAA",
            "totalCount": 42
        }));
        assert_eq!(page.entities.len(), 2);
        assert_eq!(page.next_page_key.as_deref(), Some("AQAA"));
        assert_eq!(page.total_count, Some(42));
    }

    #[test]
    fn test_parse_page_empty_cursor_ends_pagination() {
        let page = parse_page(&json!({"entities": [], "nextPageKey": ""}));
        assert!(page.next_page_key.is_none());
        let page = parse_page(&json!({"entities": []}));
        assert!(page.next_page_key.is_none());
    }

    #[test]
    fn test_parse_page_tolerates_bad_entities_payload() {
        let page = parse_page(&json!({"entities": "oops"}));
        assert!(page.entities.is_empty());
        let page = parse_page(&json!({}));
        assert!(page.entities.is_empty());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body(""), "No error details");
        let long = "x".repeat(1000);
        assert_eq!(truncate_body(&long).len(), BODY_EXCERPT_LEN);
        assert_eq!(truncate_body("short"), "short");
    }
}
