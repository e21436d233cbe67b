use serde::{Serialize, Serializer};
use std::hash::Hash;
use thiserror::Error;

/// Possible errors when interacting with `reach_lib`
///
/// Failures of individual records never show up here; they are recorded in
/// the [`Outcome`](crate::Outcome) of that record. Only configuration
/// problems and cancellation abort a whole dispatch.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The endpoint name is not part of the known catalog
    #[error("Unknown API endpoint `{0}`; expected one of: {1}")]
    InvalidEndpoint(String, String),

    /// A rate limiting parameter is zero or otherwise unusable
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    /// The requested query rate exceeds what the platform accepts
    #[error("Requested rate of {requested:.2} queries per second exceeds the maximum of {ceiling:.2}")]
    RateCeilingExceeded {
        /// Requested calls per second
        requested: f64,
        /// Hard platform ceiling in calls per second
        ceiling: f64,
    },

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The base URL of the API cannot be parsed or joined with an endpoint
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// The request client cannot be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The dispatch was cancelled before all records were processed
    #[error("Dispatch was cancelled; outstanding queries were aborted")]
    Cancelled,

    /// A dispatch task panicked or was aborted unexpectedly
    #[error("Dispatch task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ErrorKind {
    /// Returns `true` if the error stems from invalid configuration and was
    /// raised before any network activity took place.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint(..)
                | Self::InvalidRateLimit(_)
                | Self::RateCeilingExceeded { .. }
                | Self::InvalidHeader(_)
                | Self::InvalidBaseUrl(_)
                | Self::BuildRequestClient(_)
        )
    }

    /// Returns `true` if the dispatch was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidEndpoint(e1, _), Self::InvalidEndpoint(e2, _)) => e1 == e2,
            (Self::InvalidRateLimit(r1), Self::InvalidRateLimit(r2)) => r1 == r2,
            (
                Self::RateCeilingExceeded { requested: r1, .. },
                Self::RateCeilingExceeded { requested: r2, .. },
            ) => (r1 - r2).abs() < f64::EPSILON,
            (Self::InvalidBaseUrl(e1), Self::InvalidBaseUrl(e2)) => e1 == e2,
            (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::TaskJoin(e1), Self::TaskJoin(e2)) => e1.to_string() == e2.to_string(),
            (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::Cancelled, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        match self {
            Self::InvalidEndpoint(e, _) => e.hash(state),
            Self::InvalidRateLimit(r) => r.hash(state),
            Self::RateCeilingExceeded { requested, .. } => requested.to_bits().hash(state),
            Self::InvalidHeader(e) => e.to_string().hash(state),
            Self::InvalidBaseUrl(e) => e.to_string().hash(state),
            Self::BuildRequestClient(e) => e.to_string().hash(state),
            Self::TaskJoin(e) => e.to_string().hash(state),
            Self::Cancelled => std::mem::discriminant(self).hash(state),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
