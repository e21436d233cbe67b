//! Classification of attempts into success, retryable and terminal failures.
use http::StatusCode;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, VariantNames};

use crate::{Failure, Outcome};

/// How to treat a 2xx response whose document reports `errors`.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogicalFailurePolicy {
    /// Report the failure right away
    #[default]
    Terminal,
    /// Retry under the same budget as transient failures
    Retry,
}

/// Result of a single exchange, tagged with what the rate gate should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// Done; hand the outcome back to the caller
    Success(Outcome),
    /// Try again if attempts remain
    RetryableFailure(Outcome),
    /// Give up immediately
    TerminalFailure(Outcome),
}

impl Attempt {
    /// Tag an outcome according to its failure class and the logical failure policy
    #[must_use]
    pub fn classify(outcome: Outcome, policy: LogicalFailurePolicy) -> Self {
        match outcome.failure {
            None if outcome.success => Self::Success(outcome),
            Some(Failure::Transient) => Self::RetryableFailure(outcome),
            Some(Failure::Logical) if policy == LogicalFailurePolicy::Retry => {
                Self::RetryableFailure(outcome)
            }
            _ => Self::TerminalFailure(outcome),
        }
    }

    /// Unwrap the outcome carried by this attempt
    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Success(o) | Self::RetryableFailure(o) | Self::TerminalFailure(o) => o,
        }
    }
}

/// An extension trait to help determine if a given HTTP exchange
/// is retryable.
///
/// Inspired by `Retryable` from
/// [reqwest-middleware](https://github.com/TrueLayer/reqwest-middleware/blob/f854725791ccf4a02c401a26cab3d9db753f468c/reqwest-retry/src/retryable.rs)
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    /// Only rate limiting and generic server errors are worth another try.
    /// Other 5xx codes of this API indicate permanent problems.
    fn should_retry(&self) -> bool {
        *self == StatusCode::TOO_MANY_REQUESTS || *self == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl RetryExt for reqwest::Error {
    fn should_retry(&self) -> bool {
        if self.is_builder() || self.is_redirect() {
            false
        } else if let Some(status) = self.status() {
            status.should_retry()
        } else {
            // Connection refused, DNS failures, timeouts and broken bodies
            // are all transport-level problems.
            true
        }
    }
}
