use std::collections::BTreeMap;
use std::fmt::Display;

use http::HeaderMap;
use serde::{Serialize, Serializer};

const ICON_MATCH: &str = "✔";
const ICON_NO_MATCH: &str = "∅";
const ICON_ERROR: &str = "✗";

/// Why a record could not be enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Failure {
    /// Rate limited (429), server error (500) or a transport-level problem
    /// such as a refused connection or a timeout. Retried within budget.
    Transient,
    /// Any other unsuccessful status, or a malformed response document.
    /// Never retried.
    Terminal,
    /// The exchange succeeded but the document reported `errors`.
    Logical,
}

impl Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Transient => f.write_str("transient failure"),
            Failure::Terminal => f.write_str("terminal failure"),
            Failure::Logical => f.write_str("logical failure"),
        }
    }
}

/// The classified result of processing one input record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    /// Position of the record in the input sequence
    pub index: usize,
    /// Transport succeeded with a 2xx status and the document carried no errors
    pub success: bool,
    /// The service returned at least one result
    pub match_found: bool,
    /// HTTP status of the last exchange; `None` for transport failures
    pub http_status: Option<u16>,
    /// Reason phrase belonging to `http_status`
    pub reason_phrase: Option<String>,
    /// Headers of the last response
    #[serde(serialize_with = "serialize_headers")]
    pub response_headers: Option<HeaderMap>,
    /// Body of the last successful-status response, as received
    #[serde(skip)]
    pub raw_body: Option<Vec<u8>>,
    /// `raw_body` parsed as JSON
    pub parsed_body: Option<serde_json::Value>,
    /// Description of a failure, naming the record, URL and status
    pub error_description: Option<String>,
    /// Classification of a failure; `None` on success
    pub failure: Option<Failure>,
    /// Number of exchanges made for this record
    pub attempts: u32,
}

impl Outcome {
    /// Create an empty, not yet successful outcome for the record at `index`
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Mark the outcome as failed
    pub(crate) fn fail(&mut self, failure: Failure, description: String) {
        self.success = false;
        self.match_found = false;
        self.failure = Some(failure);
        self.error_description = Some(description);
    }

    /// Returns `true` if the failure may go away on a later attempt
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure == Some(Failure::Transient)
    }

    /// The results array of the parsed document, if any
    #[must_use]
    pub fn results(&self) -> Option<&Vec<serde_json::Value>> {
        self.parsed_body
            .as_ref()?
            .get("versium")?
            .get("results")?
            .as_array()
    }

    /// Icon representing the outcome in human-readable output
    #[must_use]
    pub const fn icon(&self) -> &str {
        match (self.success, self.match_found) {
            (true, true) => ICON_MATCH,
            (true, false) => ICON_NO_MATCH,
            (false, _) => ICON_ERROR,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] record #{}", self.icon(), self.code_as_string(), self.index)?;
        if let Some(failure) = self.failure {
            write!(f, " | {failure}")?;
        } else if !self.match_found {
            write!(f, " | no match")?;
        }
        Ok(())
    }
}

impl Outcome {
    fn code_as_string(&self) -> String {
        self.http_status
            .map_or_else(|| "ERR".to_string(), |code| code.to_string())
    }
}

/// Serialize response headers as a flat name to value map
fn serialize_headers<S>(headers: &Option<HeaderMap>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let map: Option<BTreeMap<String, String>> = headers.as_ref().map(|headers| {
        headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect()
    });
    map.serialize(serializer)
}
