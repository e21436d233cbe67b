//! Handler of API queries.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` runs appends of whole record batches against the API
//! endpoints, `ClientBuilder` exposes a fine-grained configuration
//! for it.
use std::time::Duration;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::dispatcher::{DispatchConfig, Dispatcher, DEFAULT_TIMEOUT};
use crate::ratelimit::{
    RateLimitConfig, DEFAULT_MAX_CALLS_PER_PERIOD, DEFAULT_MAX_CONCURRENT, DEFAULT_PERIOD,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_LIMIT,
};
use crate::retry::LogicalFailurePolicy;
use crate::{Endpoint, ErrorKind, Fields, Outcome, QueryParams, Result};

/// Default base URL of the API, `https://api.versium.com`
pub const DEFAULT_BASE_URL: &str = "https://api.versium.com";
/// Default API version, `v2`
pub const DEFAULT_API_VERSION: &str = "v2";
/// Default user agent, `reach-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("reach/", env!("CARGO_PKG_VERSION"));
/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-versium-api-key";

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// API key sent with every query.
    ///
    /// See <https://api-documentation.versium.com/docs/start-building-with-versium>
    /// on how to obtain one.
    api_key: Option<SecretString>,
    /// Scheme and host of the API, without version.
    #[builder(default_code = "String::from(DEFAULT_BASE_URL)")]
    base_url: String,
    /// Version segment of every endpoint path.
    #[builder(default_code = "String::from(DEFAULT_API_VERSION)")]
    api_version: String,
    /// Maximum number of queries started per second.
    ///
    /// By default the API allows 20 queries per second. Only raise this if
    /// your rate limit has been increased.
    #[builder(default = DEFAULT_MAX_CALLS_PER_PERIOD)]
    queries_per_second: u32,
    /// Maximum number of queries waiting for a response at the same time.
    #[builder(default = DEFAULT_MAX_CONCURRENT)]
    max_concurrency: usize,
    /// Maximum number of retries per record before its query is deemed as failed.
    #[builder(default = DEFAULT_RETRY_LIMIT)]
    max_retries: u32,
    /// Backoff step between retries.
    ///
    /// The wait grows by this amount with every failed attempt of a record,
    /// e.g. 0s, 3s, 6s, 9s.
    #[builder(default = DEFAULT_RETRY_BASE_DELAY)]
    retry_wait_time: Duration,
    /// Response timeout per query.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
    /// Whether a 2xx response reporting `errors` is retried.
    logical_failure_policy: LogicalFailurePolicy,
    /// Additional headers sent with every query.
    custom_headers: HeaderMap,
    /// User-agent used for queries.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The rate limits are zero or exceed the platform ceiling.
    /// - The API key or user-agent are not valid header values.
    /// - The base URL is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            api_key,
            base_url,
            api_version,
            user_agent,
            custom_headers: mut headers,
            ..
        } = self;

        let config = DispatchConfig {
            rate_limit: RateLimitConfig {
                max_calls_per_period: self.queries_per_second,
                period: DEFAULT_PERIOD,
                max_concurrent: self.max_concurrency,
                retry_limit: self.max_retries,
                retry_base_delay: self.retry_wait_time,
            },
            timeout: self.timeout,
            logical_failure_policy: self.logical_failure_policy,
        };
        config.rate_limit.validate()?;

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(ErrorKind::InvalidHeader)?,
        );
        match api_key.as_ref().map(ExposeSecret::expose_secret) {
            Some(key) if !key.is_empty() => {
                let mut value = HeaderValue::from_str(key).map_err(ErrorKind::InvalidHeader)?;
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
            }
            _ => log::warn!("No API key configured; queries will likely be rejected"),
        }

        let base_url = Url::parse(&base_url)?;

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .timeout(self.timeout)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        Ok(Client {
            dispatcher: Dispatcher::new(reqwest_client, base_url, api_version, headers, config),
        })
    }
}

/// Runs appends against the API endpoints.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Dispatcher,
}

impl Client {
    /// The dispatch settings derived from the builder
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        self.dispatcher.config()
    }

    /// Query `endpoint` once per record, requesting `outputs`, and return
    /// the outcomes in input order.
    ///
    /// `params` are sent with every query. Record fields win over parameters
    /// of the same name.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the endpoint is unknown. Failures of single
    /// records are reported in their [`Outcome`].
    pub async fn append(
        &self,
        endpoint: &str,
        records: Vec<Fields>,
        outputs: &[&str],
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_until_cancelled(endpoint, records, outputs, params, &CancellationToken::new())
            .await
    }

    /// Like [`Client::append`], stopping all outstanding queries once
    /// `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Cancelled`] on cancellation, without partial
    /// results.
    pub async fn append_until_cancelled(
        &self,
        endpoint: &str,
        records: Vec<Fields>,
        outputs: &[&str],
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<Vec<Outcome>> {
        let params = params.with_outputs(outputs);
        self.dispatcher
            .dispatch_until_cancelled(records, endpoint, params, cancel)
            .await
    }

    async fn append_to(
        &self,
        endpoint: Endpoint,
        records: Vec<Fields>,
        outputs: Option<&[&str]>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        let outputs = outputs.unwrap_or_else(|| endpoint.default_outputs());
        self.append(&endpoint.to_string(), records, outputs, params)
            .await
    }

    /// Contact append; requests address, phone and email unless `outputs` is given.
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn contact(
        &self,
        records: Vec<Fields>,
        outputs: Option<&[&str]>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::Contact, records, outputs, params)
            .await
    }

    /// Demographic append; requests demographic, lifestyle, financial and
    /// political data unless `outputs` is given.
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn demographic(
        &self,
        records: Vec<Fields>,
        outputs: Option<&[&str]>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::Demographic, records, outputs, params)
            .await
    }

    /// Business to consumer online audience append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn b2c_online_audience(
        &self,
        records: Vec<Fields>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::B2cOnlineAudience, records, None, params)
            .await
    }

    /// Business to business online audience append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn b2b_online_audience(
        &self,
        records: Vec<Fields>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::B2bOnlineAudience, records, None, params)
            .await
    }

    /// Firmographic append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn firmographic(
        &self,
        records: Vec<Fields>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::Firmographic, records, None, params)
            .await
    }

    /// Consumer to business append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn c2b(&self, records: Vec<Fields>, params: QueryParams) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::C2b, records, None, params).await
    }

    /// IP to domain append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn ip_to_domain(
        &self,
        records: Vec<Fields>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::IpToDomain, records, None, params)
            .await
    }

    /// Hashed email to business domain append
    ///
    /// # Errors
    ///
    /// See [`Client::append`].
    pub async fn hem_to_business_domain(
        &self,
        records: Vec<Fields>,
        params: QueryParams,
    ) -> Result<Vec<Outcome>> {
        self.append_to(Endpoint::HemToBusinessDomain, records, None, params)
            .await
    }
}
