//! Fan-out of one rate-limited query per record and order-preserving fan-in
//! of the outcomes.
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetcher::Fetcher;
use crate::ratelimit::{RateGate, RateLimitConfig};
use crate::retry::LogicalFailurePolicy;
use crate::{Endpoint, ErrorKind, Fields, Outcome, QueryParams, Record, Result};

/// Default timeout for a single exchange, 20 seconds
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings applied to every dispatch of a [`Dispatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Rate, concurrency and retry limits
    #[serde(flatten)]
    pub rate_limit: RateLimitConfig,

    /// Timeout of each individual exchange
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Whether logical failures are retried
    #[serde(default)]
    pub logical_failure_policy: LogicalFailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            logical_failure_policy: LogicalFailurePolicy::default(),
        }
    }
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Turns a sequence of records into a sequence of [`Outcome`]s of the same
/// length and order, issuing one query per record.
///
/// Every call to [`Dispatcher::dispatch`] gets its own [`RateGate`]; limits
/// are never shared between unrelated dispatches.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: Url,
    api_version: String,
    headers: HeaderMap,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher sending requests to `<base_url>/<api_version>/<endpoint>`
    #[must_use]
    pub const fn new(
        client: reqwest::Client,
        base_url: Url,
        api_version: String,
        headers: HeaderMap,
        config: DispatchConfig,
    ) -> Self {
        Self {
            client,
            base_url,
            api_version,
            headers,
            config,
        }
    }

    /// The settings used for each dispatch
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Full URL of `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL and version don't form a valid URL.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let version = self.api_version.trim_matches('/');
        Ok(Url::parse(&format!("{base}/{version}/{endpoint}"))?)
    }

    /// Query `endpoint` once per record and return the outcomes in input order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown endpoint or invalid rate
    /// limits. Individual record failures are reported in their [`Outcome`].
    pub async fn dispatch(
        &self,
        records: Vec<Fields>,
        endpoint: &str,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.dispatch_until_cancelled(records, endpoint, params, &CancellationToken::new())
            .await
    }

    /// Like [`Dispatcher::dispatch`], but aborts all outstanding work once
    /// `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`Dispatcher::dispatch`], returns
    /// [`ErrorKind::Cancelled`] on cancellation. No partial results are
    /// returned in that case.
    pub async fn dispatch_until_cancelled(
        &self,
        records: Vec<Fields>,
        endpoint: &str,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Vec<Outcome>> {
        let endpoint = Endpoint::parse(endpoint)?;
        let url = self.endpoint_url(endpoint)?;
        self.config.rate_limit.validate()?;

        if records.is_empty() {
            log::debug!("No records to dispatch");
            return Ok(Vec::new());
        }

        // Stops the gate of this dispatch however we leave this function
        let token = cancel.child_token();
        let _guard = token.clone().drop_guard();
        let gate = Arc::new(RateGate::new(self.config.rate_limit, token.clone())?);
        let fetcher = Arc::new(Fetcher::new(
            self.client.clone(),
            url,
            self.headers.clone(),
            params,
            self.config.timeout,
            self.config.logical_failure_policy,
        ));

        let records = Record::enumerate(records);
        let total = records.len();
        log::info!("Dispatching {total} records to {}", fetcher.url());

        let mut tasks = JoinSet::new();
        for record in records {
            let gate = Arc::clone(&gate);
            let fetcher = Arc::clone(&fetcher);
            tasks.spawn(async move {
                let (record, fetcher) = (&record, &*fetcher);
                let outcome = gate
                    .execute(move |attempts_left| {
                        log::debug!(
                            "Attempting {record}, {attempts_left} attempts left afterwards"
                        );
                        fetcher.fetch_once(record)
                    })
                    .await;
                (record.index(), outcome)
            });
        }

        let mut slots: Vec<Option<Outcome>> = vec![None; total];
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tasks.abort_all();
                    log::warn!("Dispatch cancelled with {} of {total} records outstanding", tasks.len());
                    return Err(ErrorKind::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => {
                        let (index, outcome) = joined?;
                        slots[index] = Some(outcome?);
                    }
                    None => break,
                }
            }
        }

        let outcomes: Vec<Outcome> = slots.into_iter().flatten().collect();
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let matched = outcomes.iter().filter(|o| o.match_found).count();
        log::info!(
            "Dispatch finished: {total} records, {succeeded} succeeded ({matched} with matches), {} failed",
            total - succeeded
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_utils::{load_fixture, mock_api, mount_endpoint, versium_body};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;
    use wiremock::{MockServer, Request, ResponseTemplate};

    use super::DispatchConfig;
    use crate::ratelimit::RateLimitConfig;
    use crate::retry::LogicalFailurePolicy;
    use crate::test_utils::{dispatcher, fields, query_value, unreachable_uri};
    use crate::{ErrorKind, Failure, QueryParams};

    fn config(retry_limit: u32) -> DispatchConfig {
        DispatchConfig {
            rate_limit: RateLimitConfig {
                max_calls_per_period: 100,
                period: Duration::from_secs(1),
                max_concurrent: 10,
                retry_limit,
                retry_base_delay: Duration::from_millis(10),
            },
            timeout: Duration::from_secs(2),
            logical_failure_policy: LogicalFailurePolicy::Terminal,
        }
    }

    fn records(n: usize) -> Vec<crate::Fields> {
        (0..n)
            .map(|i| fields(&[("id", &i.to_string()), ("first", "John")]))
            .collect()
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let server = MockServer::start().await;
        // Earlier records take longer, so completion order is reversed
        let responder = |req: &Request| {
            let id: u64 = query_value(req, "id").unwrap().parse().unwrap();
            ResponseTemplate::new(200)
                .set_body_json(versium_body!(json!({ "id": id })))
                .set_delay(Duration::from_millis((10 - id) * 30))
        };
        mount_endpoint!(server, "/v2/contact", responder, 10);

        let outcomes = dispatcher(&server.uri(), config(0))
            .dispatch(records(10), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 10);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert!(outcome.match_found);
            assert_eq!(outcome.results().unwrap()[0]["id"], json!(i));
        }
    }

    #[tokio::test]
    async fn test_exhaustive_retry_count() {
        let server = MockServer::start().await;
        mount_endpoint!(server, "/v2/contact", ResponseTemplate::new(429), 6);

        let outcomes = dispatcher(&server.uri(), config(2))
            .dispatch(records(2), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 6);
        for outcome in outcomes {
            assert!(!outcome.success);
            assert_eq!(outcome.attempts, 3);
            assert_eq!(outcome.http_status, Some(429));
            assert_eq!(outcome.failure, Some(Failure::Transient));
        }
    }

    #[tokio::test]
    async fn test_partial_retry_converges() {
        let server = MockServer::start().await;
        let seen: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let responder = move |req: &Request| {
            let id = query_value(req, "id").unwrap();
            let mut seen = seen.lock().unwrap();
            let count = seen.entry(id).or_default();
            *count += 1;
            if *count == 1 {
                ResponseTemplate::new(429)
            } else {
                ResponseTemplate::new(200).set_body_string(load_fixture!("contact.json"))
            }
        };
        mount_endpoint!(server, "/v2/contact", responder, 4);

        let outcomes = dispatcher(&server.uri(), config(2))
            .dispatch(records(2), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 4);
        assert!(outcomes.iter().all(|o| o.success && o.attempts == 2));
    }

    #[tokio::test]
    async fn test_terminal_statuses_are_not_retried() {
        const STATUSES: [u16; 15] = [
            400, 401, 402, 403, 404, 405, 408, 413, 415, 501, 502, 503, 504, 505, 418,
        ];
        let server = MockServer::start().await;
        let responder = |req: &Request| {
            let id: usize = query_value(req, "id").unwrap().parse().unwrap();
            ResponseTemplate::new(STATUSES[id])
        };
        mount_endpoint!(server, "/v2/contact", responder, 15);

        let outcomes = dispatcher(&server.uri(), config(3))
            .dispatch(records(15), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 15);
        for (outcome, status) in outcomes.iter().zip(STATUSES) {
            assert_eq!(outcome.http_status, Some(status));
            assert_eq!(outcome.attempts, 1);
            assert_eq!(outcome.failure, Some(Failure::Terminal));
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        mount_endpoint!(server, "/v2/demographic", ResponseTemplate::new(500), 3);

        let outcomes = dispatcher(&server.uri(), config(2))
            .dispatch(records(1), "Demographic", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(outcomes[0].attempts, 3);
        assert!(outcomes[0].is_transient());
    }

    #[tokio::test]
    async fn test_empty_input_sends_nothing() {
        let server = MockServer::start().await;
        mount_endpoint!(server, "/v2/contact", ResponseTemplate::new(200), 0);

        let outcomes = dispatcher(&server.uri(), config(3))
            .dispatch(Vec::new(), "contact", QueryParams::new())
            .await
            .unwrap();

        assert!(outcomes.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logical_failure() {
        let server = mock_api!(200, set_body_string(load_fixture!("errors.json")));

        let outcomes = dispatcher(&server.uri(), config(3))
            .dispatch(records(1), "contact", QueryParams::new())
            .await
            .unwrap();

        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].http_status, Some(200));
        assert_eq!(outcomes[0].failure, Some(Failure::Logical));
        assert_eq!(outcomes[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_logical_failure_retry_policy() {
        let server = MockServer::start().await;
        mount_endpoint!(
            server,
            "/v2/contact",
            ResponseTemplate::new(200).set_body_string(load_fixture!("errors.json")),
            3
        );
        let config = DispatchConfig {
            logical_failure_policy: LogicalFailurePolicy::Retry,
            ..config(2)
        };

        let outcomes = dispatcher(&server.uri(), config)
            .dispatch(records(1), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(outcomes[0].attempts, 3);
        assert_eq!(outcomes[0].failure, Some(Failure::Logical));
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let outcomes = dispatcher(&unreachable_uri(), config(2))
            .dispatch(records(3), "contact", QueryParams::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        for outcome in outcomes {
            assert_eq!(outcome.http_status, None);
            assert_eq!(outcome.attempts, 3);
            assert!(outcome.is_transient());
        }
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_before_any_request() {
        let server = MockServer::start().await;
        mount_endpoint!(server, "/v2/contacts", ResponseTemplate::new(200), 0);

        let err = dispatcher(&server.uri(), config(3))
            .dispatch(records(3), "contacts", QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ErrorKind::InvalidEndpoint(..)));
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_rate_ceiling_fails_before_any_request() {
        let server = MockServer::start().await;
        mount_endpoint!(server, "/v2/contact", ResponseTemplate::new(200), 0);
        let mut config = config(0);
        config.rate_limit.max_calls_per_period = 1000;

        let err = dispatcher(&server.uri(), config)
            .dispatch(records(3), "contact", QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ErrorKind::RateCeilingExceeded { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_returns_no_partial_results() {
        let server = MockServer::start().await;
        let responder = |req: &Request| {
            // The first record answers right away, the rest hang
            if query_value(req, "id").as_deref() == Some("0") {
                ResponseTemplate::new(200).set_body_string(load_fixture!("no_match.json"))
            } else {
                ResponseTemplate::new(200).set_delay(Duration::from_secs(30))
            }
        };
        mount_endpoint!(server, "/v2/contact", responder, 1..=5);

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            }
        };
        let mut config = config(0);
        config.timeout = Duration::from_secs(60);
        let dispatcher = dispatcher(&server.uri(), config);

        let began = Instant::now();
        let (result, ()) = tokio::join!(
            dispatcher.dispatch_until_cancelled(records(5), "contact", QueryParams::new(), &cancel),
            canceller
        );

        assert_eq!(result.unwrap_err(), ErrorKind::Cancelled);
        assert!(began.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_dispatch_config_from_toml() {
        let config: DispatchConfig = toml::from_str(
            r#"
            max_calls_per_period = 10
            retry_limit = 1
            timeout = "5s"
            logical_failure_policy = "retry"
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.max_calls_per_period, 10);
        assert_eq!(config.rate_limit.retry_limit, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.logical_failure_policy, LogicalFailurePolicy::Retry);
        assert_eq!(
            config.rate_limit.max_concurrent,
            crate::ratelimit::DEFAULT_MAX_CONCURRENT
        );
    }

    #[test]
    fn test_endpoint_url() {
        let dispatcher = dispatcher("https://api.example.com/", DispatchConfig::default());
        assert_eq!(
            dispatcher
                .endpoint_url(crate::Endpoint::B2cOnlineAudience)
                .unwrap()
                .as_str(),
            "https://api.example.com/v2/b2cOnlineAudience"
        );
    }
}
