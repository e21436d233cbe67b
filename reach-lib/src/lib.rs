//! `reach_lib` enriches batches of records through the Versium Reach API.
//!
//! Every record becomes one query. Queries run concurrently, but never more
//! than a configured number at once and never faster than a configured rate;
//! failed queries are retried with a linearly growing backoff. The outcomes
//! come back in the order of the input records.
//!
//! ```no_run
//! use reach_lib::{ClientBuilder, Fields, QueryParams, Result};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .api_key(SecretString::from("my-api-key"))
//!       .build()
//!       .client()?;
//!
//!   let record: Fields = [
//!       ("first".to_string(), Some("John".to_string())),
//!       ("last".to_string(), Some("Doe".to_string())),
//!       ("zip".to_string(), Some("10001".to_string())),
//!   ]
//!   .into_iter()
//!   .collect();
//!
//!   let outcomes = client.contact(vec![record], None, QueryParams::new()).await?;
//!   for outcome in outcomes {
//!       println!("{outcome}");
//!   }
//!   Ok(())
//! }
//! ```
//!
//! The building blocks are public as well: a [`Dispatcher`] runs one batch
//! against any endpoint, the [`RateGate`](ratelimit::RateGate) enforces the
//! limits of one dispatch and drives its retries.
#![warn(missing_docs)]

mod client;
mod dispatcher;
mod fetcher;
mod retry;
mod types;

pub mod ratelimit;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{
    Client, ClientBuilder, API_KEY_HEADER, DEFAULT_API_VERSION, DEFAULT_BASE_URL,
    DEFAULT_USER_AGENT,
};
pub use dispatcher::{DispatchConfig, Dispatcher, DEFAULT_TIMEOUT};
pub use fetcher::Fetcher;
pub use retry::{Attempt, LogicalFailurePolicy};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
