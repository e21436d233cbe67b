use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, VariantNames};

use crate::{ErrorKind, Result};

/// The known Reach API endpoints.
///
/// Names are matched case-insensitively; [`Display`](std::fmt::Display)
/// renders the canonical spelling, which is the path segment sent to the API.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Endpoint {
    /// Postal address, phone and email append
    #[strum(serialize = "contact")]
    #[serde(rename = "contact")]
    Contact,
    /// Demographic, lifestyle, financial and political append
    #[strum(serialize = "demographic")]
    #[serde(rename = "demographic")]
    Demographic,
    /// Business-to-consumer online audience append
    #[strum(serialize = "b2cOnlineAudience")]
    #[serde(rename = "b2cOnlineAudience")]
    B2cOnlineAudience,
    /// Business-to-business online audience append
    #[strum(serialize = "b2bOnlineAudience")]
    #[serde(rename = "b2bOnlineAudience")]
    B2bOnlineAudience,
    /// Company level append
    #[strum(serialize = "firmographic")]
    #[serde(rename = "firmographic")]
    Firmographic,
    /// Consumer-to-business append
    #[strum(serialize = "c2b")]
    #[serde(rename = "c2b")]
    C2b,
    /// IP address to company domain
    #[strum(serialize = "iptodomain")]
    #[serde(rename = "iptodomain")]
    IpToDomain,
    /// Hashed email to business domain
    #[strum(serialize = "hemtobusinessdomain")]
    #[serde(rename = "hemtobusinessdomain")]
    HemToBusinessDomain,
}

impl Endpoint {
    /// Look up an endpoint by name, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidEndpoint`] if the name is not in the catalog.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim().trim_matches('/'))
            .map_err(|_| ErrorKind::InvalidEndpoint(name.to_string(), Self::VARIANTS.join(", ")))
    }

    /// Outputs requested when the caller does not pick any.
    #[must_use]
    pub const fn default_outputs(self) -> &'static [&'static str] {
        match self {
            Self::Contact => &["address", "phone", "email"],
            Self::Demographic => &["demographic", "lifestyle", "financial", "political"],
            _ => &[],
        }
    }
}
