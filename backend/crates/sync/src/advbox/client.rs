use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use intranet_common::error::{IntranetError, IntranetResult};
use intranet_config::{get_var, get_var_or, parse_var_or};

use super::models::ListResponse;
use crate::clock::Clock;
use crate::error::SourceError;
use crate::source::{BackoffPolicy, Page};

pub const DEFAULT_BASE_URL: &str = "https://app.advbox.com.br/api/v1";

#[derive(Debug, Clone)]
pub struct AdvboxClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl AdvboxClientConfig {
    /// Load Advbox config from environment.
    ///
    /// `ADVBOX_API_TOKEN` is mandatory; without it no sync can run, so this
    /// fails before any job row is written.
    pub fn from_env() -> IntranetResult<Self> {
        let api_token = get_var("ADVBOX_API_TOKEN")?;
        let base_url = get_var_or("ADVBOX_BASE_URL", DEFAULT_BASE_URL);
        if base_url.trim().is_empty() {
            return Err(IntranetError::Config(
                "ADVBOX_BASE_URL is set but empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            max_retries: parse_var_or("ADVBOX_MAX_RETRIES", 5)?,
            base_delay_ms: parse_var_or("ADVBOX_BASE_DELAY_MS", 2000)?,
            timeout_secs: parse_var_or("ADVBOX_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }

    /// Longest one `get_page` call can take: every attempt times out and
    /// every 429 wait is served in full.
    pub fn worst_case_fetch(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        Duration::from_secs(self.timeout_secs)
            .saturating_mul(attempts)
            .saturating_add(self.backoff().total_delay(self.max_retries))
    }
}

#[derive(Clone)]
pub struct AdvboxClient {
    client: Client,
    config: AdvboxClientConfig,
    clock: Arc<dyn Clock>,
}

impl AdvboxClient {
    pub fn new(config: AdvboxClientConfig, clock: Arc<dyn Clock>) -> IntranetResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IntranetError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &AdvboxClientConfig {
        &self.config
    }

    /// Fetch one page of `collection`, backing off on 429 until the retry
    /// budget is spent.
    pub async fn get_page(
        &self,
        collection: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<serde_json::Value>, SourceError> {
        let url = format!("{}/{}", self.config.base_url, collection);
        let policy = self.config.backoff();

        for attempt in 0..=policy.max_retries {
            match self.request_once(&url, offset, limit).await {
                Err(SourceError::RateLimited) if attempt < policy.max_retries => {
                    let wait = policy.delay_for(attempt);
                    tracing::warn!(
                        collection,
                        offset,
                        retry = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "rate-limited, backing off"
                    );
                    self.clock.sleep(wait).await;
                }
                Err(SourceError::RateLimited) => break,
                other => return other,
            }
        }

        Err(SourceError::RetriesExhausted {
            attempts: policy.max_retries + 1,
        })
    }

    async fn request_once(
        &self,
        url: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<serde_json::Value>, SourceError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Http { status, body });
        }

        let body = response.text().await?;
        let parsed: ListResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::InvalidBody(e.to_string()))?;

        tracing::debug!(
            url,
            offset,
            returned = parsed.data.len(),
            total = ?parsed.total_count,
            "fetched page"
        );

        Ok(Page::new(parsed.data, parsed.total_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> AdvboxClientConfig {
        AdvboxClientConfig {
            base_url: base_url.to_string(),
            api_token: "adv-token".to_string(),
            max_retries: 5,
            base_delay_ms: 2000,
            timeout_secs: 5,
        }
    }

    #[test]
    fn worst_case_fetch_counts_timeouts_and_waits() {
        let config = AdvboxClientConfig {
            timeout_secs: 30,
            ..test_config("http://localhost")
        };
        // 2+4+8+16+32 seconds of waits and six timed-out attempts
        assert_eq!(config.worst_case_fetch(), Duration::from_secs(62 + 180));
    }

    fn page_body(count: usize, total: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| serde_json::json!({ "id": i + 1, "name": format!("Customer {}", i + 1) }))
            .collect();
        serde_json::json!({ "data": data, "totalCount": total })
    }

    fn client(server: &MockServer, clock: &ManualClock) -> AdvboxClient {
        AdvboxClient::new(test_config(&server.uri()), Arc::new(clock.clone())).unwrap()
    }

    #[tokio::test]
    async fn fetches_page_with_limit_offset_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("limit", "100"))
            .and(query_param("offset", "200"))
            .and(header("authorization", "Bearer adv-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(3, 203)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let page = client(&server, &clock)
            .get_page("customers", 200, 100)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_count, Some(203));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn two_rate_limits_then_success_waits_2s_then_4s() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, 1)))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let page = client(&server, &clock)
            .get_page("customers", 0, 100)
            .await
            .expect("should succeed after backoff");
        assert_eq!(page.items.len(), 1);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(2000), Duration::from_millis(4000)]
        );
    }

    #[tokio::test]
    async fn waits_sum_to_backoff_bound_at_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(5)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, 1)))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let c = client(&server, &clock);
        c.get_page("customers", 0, 100).await.expect("5 retries allowed");

        let total: Duration = clock.sleeps().iter().sum();
        assert_eq!(total, c.config().backoff().total_delay(5));
    }

    #[tokio::test]
    async fn one_rate_limit_past_max_retries_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(429))
            .expect(6)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let err = client(&server, &clock)
            .get_page("customers", 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RetriesExhausted { attempts: 6 }));
        assert_eq!(clock.sleeps().len(), 5);
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let err = client(&server, &clock)
            .get_page("customers", 0, 100)
            .await
            .unwrap_err();
        match err {
            SourceError::Http { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected Http, got: {other:?}"),
        }
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let err = client(&server, &clock)
            .get_page("customers", 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn missing_total_count_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lawsuits"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let page = client(&server, &clock)
            .get_page("lawsuits", 0, 100)
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_count, None);
    }

    // ── Config ───────────────────────────────────────────────────

    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn from_env_fails_without_token() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ADVBOX_API_TOKEN");
        let err = AdvboxClientConfig::from_env().unwrap_err();
        assert!(matches!(err, IntranetError::Config(_)));
        assert!(err.to_string().contains("ADVBOX_API_TOKEN"));
    }

    #[test]
    fn from_env_applies_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("ADVBOX_API_TOKEN", "tok");
        std::env::remove_var("ADVBOX_BASE_URL");
        std::env::remove_var("ADVBOX_MAX_RETRIES");
        std::env::remove_var("ADVBOX_BASE_DELAY_MS");
        let cfg = AdvboxClientConfig::from_env().unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.base_delay_ms, 2000);
        std::env::remove_var("ADVBOX_API_TOKEN");
    }

    #[test]
    fn from_env_rejects_non_numeric_retries() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("ADVBOX_API_TOKEN", "tok");
        std::env::set_var("ADVBOX_MAX_RETRIES", "many");
        let err = AdvboxClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("ADVBOX_MAX_RETRIES"));
        std::env::remove_var("ADVBOX_API_TOKEN");
        std::env::remove_var("ADVBOX_MAX_RETRIES");
    }

    #[test]
    fn from_env_trims_trailing_slash() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("ADVBOX_API_TOKEN", "tok");
        std::env::set_var("ADVBOX_BASE_URL", "https://advbox.test/api/v1/");
        let cfg = AdvboxClientConfig::from_env().unwrap();
        assert_eq!(cfg.base_url, "https://advbox.test/api/v1");
        std::env::remove_var("ADVBOX_API_TOKEN");
        std::env::remove_var("ADVBOX_BASE_URL");
    }
}
