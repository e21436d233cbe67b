//! A single HTTP exchange for a single record.
//!
//! The [`Fetcher`] never retries; it classifies what happened and leaves the
//! decision to the [`RateGate`](crate::ratelimit::RateGate).
use std::time::Duration;

use http::HeaderMap;
use reqwest::Url;

use crate::retry::{Attempt, LogicalFailurePolicy, RetryExt};
use crate::{Failure, Outcome, QueryParams, Record};

/// Performs one POST per record against a fixed endpoint URL.
#[derive(Debug, Clone)]
pub struct Fetcher {
    /// Underlying `reqwest` client instance that handles the HTTP requests.
    client: reqwest::Client,
    /// Full endpoint URL, without query
    url: Url,
    /// Headers sent with every request
    headers: HeaderMap,
    /// Static parameters merged into every request
    params: QueryParams,
    /// Upper bound for a single exchange, including reading the body
    timeout: Duration,
    policy: LogicalFailurePolicy,
}

impl Fetcher {
    /// Create a fetcher for the endpoint at `url`
    #[must_use]
    pub const fn new(
        client: reqwest::Client,
        url: Url,
        headers: HeaderMap,
        params: QueryParams,
        timeout: Duration,
        policy: LogicalFailurePolicy,
    ) -> Self {
        Self {
            client,
            url,
            headers,
            params,
            timeout,
            policy,
        }
    }

    /// The endpoint URL requests are sent to
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Build the request URL for `record`: static parameters merged with the
    /// record's non-null fields, record fields taking precedence.
    #[must_use]
    pub fn request_url(&self, record: &Record) -> Url {
        let pairs = self.params.merged_with(record);
        let mut url = self.url.clone();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(&pairs);
        }
        url
    }

    /// Perform exactly one exchange for `record` and classify its result.
    pub async fn fetch_once(&self, record: &Record) -> Attempt {
        let url = self.request_url(record);
        let mut outcome = Outcome::new(record.index());

        log::debug!("Querying {record}");
        let response = match self
            .client
            .post(url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let failure = if e.should_retry() {
                    Failure::Transient
                } else {
                    Failure::Terminal
                };
                outcome.fail(
                    failure,
                    format!(
                        "Error during url fetch: {e} (index: {}, url: {url}, status: UNKNOWN)",
                        record.index()
                    ),
                );
                return Attempt::classify(outcome, self.policy);
            }
        };

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("Unknown");
        outcome.http_status = Some(status.as_u16());
        outcome.reason_phrase = Some(reason.to_string());
        outcome.response_headers = Some(response.headers().clone());
        outcome.success = status.is_success();

        if !outcome.success {
            outcome.raw_body = response.bytes().await.ok().map(|b| b.to_vec());
            let failure = if status.should_retry() {
                Failure::Transient
            } else {
                Failure::Terminal
            };
            outcome.fail(
                failure,
                format!(
                    "Unsuccessful url fetch: {reason} (index: {}, url: {url}, status: {})",
                    record.index(),
                    status.as_u16()
                ),
            );
            return Attempt::classify(outcome, self.policy);
        }

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                outcome.fail(
                    Failure::Transient,
                    format!(
                        "Error reading response body: {e} (index: {}, url: {url}, status: {})",
                        record.index(),
                        status.as_u16()
                    ),
                );
                return Attempt::classify(outcome, self.policy);
            }
        };

        inspect_document(&mut outcome, &body, &url);
        outcome.raw_body = Some(body);
        Attempt::classify(outcome, self.policy)
    }
}

/// Parse a 2xx body and derive `success`, `match_found` and logical failures
/// from the `{"versium": {...}}` document.
fn inspect_document(outcome: &mut Outcome, body: &[u8], url: &Url) {
    let index = outcome.index;
    let document: serde_json::Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => {
            outcome.fail(
                Failure::Terminal,
                format!("Cannot parse response body as JSON: {e} (index: {index}, url: {url})"),
            );
            return;
        }
    };

    let Some(payload) = document.get("versium").filter(|p| p.is_object()) else {
        outcome.fail(
            Failure::Terminal,
            format!("Response document has no `versium` object (index: {index}, url: {url})"),
        );
        outcome.parsed_body = Some(document);
        return;
    };

    if let Some(errors) = payload.get("errors") {
        outcome.fail(
            Failure::Logical,
            format!("API reported errors: {errors} (index: {index}, url: {url})"),
        );
    } else if payload
        .get("results")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|results| !results.is_empty())
    {
        outcome.match_found = true;
    } else {
        log::debug!("API call successful but there were no matches for record #{index}");
    }
    outcome.parsed_body = Some(document);
}
