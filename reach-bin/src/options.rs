use crate::input::InputFormat;
use crate::verbosity::Verbosity;
use crate::writer::OutputFormat;
use anyhow::{anyhow, Context, Error, Result};
use clap::builder::TypedValueParser;
use clap::Parser;
use const_format::{concatcp, formatcp};
use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap,
};
use reach_lib::ratelimit::{
    DEFAULT_MAX_CALLS_PER_PERIOD, DEFAULT_MAX_CONCURRENT, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_RETRY_LIMIT,
};
use reach_lib::{
    LogicalFailurePolicy, QueryParams, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};

pub(crate) const REACH_CONFIG_FILE: &str = "reach.toml";

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const QUERIES_PER_SECOND_STR: &str = concatcp!(DEFAULT_MAX_CALLS_PER_PERIOD);
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENT);
const MAX_RETRIES_STR: &str = concatcp!(DEFAULT_RETRY_LIMIT);
const RETRY_WAIT_TIME_STR: &str = "3s";
const TIMEOUT_STR: &str = "20s";
// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    REACH_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    base_url: String = DEFAULT_BASE_URL.to_string();
    api_version: String = DEFAULT_API_VERSION.to_string();
    queries_per_second: u32 = DEFAULT_MAX_CALLS_PER_PERIOD;
    max_concurrency: usize = DEFAULT_MAX_CONCURRENT;
    max_retries: u32 = DEFAULT_RETRY_LIMIT;
    retry_wait_time: Duration = DEFAULT_RETRY_BASE_DELAY;
    timeout: Duration = DEFAULT_TIMEOUT;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Split `input` at the first `separator` into a trimmed, non-empty name and
/// a trimmed value
fn split_pair<'a>(input: &'a str, separator: char, what: &str) -> Result<(&'a str, &'a str)> {
    match input.split_once(separator) {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(anyhow!(
            "Invalid {what} format. Expected a string in the format 'name{separator}value'"
        )),
    }
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = split_pair(header, ':', "header")?;
    let name = HeaderName::from_str(name)
        .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
    Ok((name, value))
}

/// Parses a single HTTP header into a tuple of (String, String)
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid = |message: String| {
            clap::Error::raw(clap::error::ErrorKind::InvalidValue, message)
        };
        let header_str = value
            .to_str()
            .ok_or_else(|| invalid("Header value contains invalid UTF-8".to_string()))?;

        let (name, value) = parse_single_header(header_str).map_err(|e| invalid(e.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| invalid("Header value contains invalid UTF-8".to_string()))?;
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Parse a static query parameter given as `name=value`
fn parse_param(param: &str) -> Result<(String, String), String> {
    split_pair(param, '=', "parameter")
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .map_err(|e| e.to_string())
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value for '{name}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// Append records from a CSV or JSON file with data from the Versium Reach API.
///
/// Every input record becomes one query against the chosen endpoint. The
/// outcomes are written in input order, one per line.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct ReachOptions {
    /// API endpoint to query
    #[arg(long_help = "API endpoint to query, ignoring case. One of:
contact, demographic, b2cOnlineAudience, b2bOnlineAudience, firmographic, c2b,
iptodomain, hemtobusinessdomain")]
    pub(crate) endpoint: String,

    /// File with the input records, or `-` for standard input
    #[arg(long_help = "File with the input records, or `-` for standard input.

The format is derived from the file extension (`.csv`, `.json`, `.jsonl`)
unless `--input-format` is given. Standard input defaults to JSON lines.
Field names become query parameters; empty CSV cells and JSON nulls are
not sent.")]
    pub(crate) input: PathBuf,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Deserialize a TOML table of strings, e.g. `[params]` or `[header]`
fn deserialize_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for reach
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// API key of your Versium Reach account
    #[arg(long, env = "REACH_API_KEY", hide_env_values = true)]
    #[serde(default)]
    pub(crate) api_key: Option<SecretString>,

    /// Base URL of the API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    #[serde(default = "base_url")]
    pub(crate) base_url: String,

    /// API version used in the endpoint path
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    #[serde(default = "api_version")]
    pub(crate) api_version: String,

    /// Maximum number of queries started per second
    #[arg(long, default_value = &QUERIES_PER_SECOND_STR)]
    #[serde(default = "queries_per_second")]
    pub(crate) queries_per_second: u32,

    /// Maximum number of queries waiting for a response at once
    #[arg(long, default_value = &MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Maximum number of retries per record
    #[arg(long, default_value = &MAX_RETRIES_STR)]
    #[serde(default = "max_retries")]
    pub(crate) max_retries: u32,

    /// Backoff step between retries of a record, e.g. `3s` or `500ms`
    #[arg(short, long, default_value = RETRY_WAIT_TIME_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "retry_wait_time", with = "humantime_serde")]
    pub(crate) retry_wait_time: Duration,

    /// Timeout of a single query, e.g. `20s`
    #[arg(short, long, default_value = TIMEOUT_STR, value_parser = humantime::parse_duration)]
    #[serde(default = "timeout", with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// How to treat responses reporting errors: `terminal` or `retry`
    #[arg(long, default_value = "terminal")]
    #[serde(default)]
    pub(crate) logical_failure_policy: LogicalFailurePolicy,

    /// Outputs to request, comma-separated (default depends on the endpoint)
    #[arg(short = 'O', long, value_delimiter = ',')]
    #[serde(default)]
    pub(crate) outputs: Vec<String>,

    /// Static query parameter sent with every query, e.g. `--param cfg_max_recs=1`
    #[arg(short, long = "param", value_parser = parse_param)]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_pairs")]
    pub(crate) params: Vec<(String, String)>,

    /// Custom request header, e.g. `--header 'X-Trace: on'`
    #[arg(short = 'H', long, value_parser = HeaderParser)]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_pairs")]
    pub(crate) header: Vec<(String, String)>,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Format of the input file: `csv`, `json` or `jsonl`
    #[arg(long)]
    #[serde(default)]
    pub(crate) input_format: Option<InputFormat>,

    /// Output file of the outcomes (default: standard output)
    #[arg(short, long, value_parser)]
    #[serde(default)]
    pub(crate) output: Option<PathBuf>,

    /// Output format: `jsonl` (one JSON document per record) or `compact`
    #[arg(short, long, default_value = "jsonl")]
    #[serde(default)]
    pub(crate) format: OutputFormat,
}

impl Config {
    /// Merge `other` into `pairs`; entries of `pairs` win on equal names
    fn merge_pairs(pairs: &mut Vec<(String, String)>, other: Vec<(String, String)>) {
        let mut merged: Vec<(String, String)> = other
            .into_iter()
            .filter(|(name, _)| !pairs.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)))
            .collect();
        merged.append(pairs);
        *pairs = merged;
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        Self::merge_pairs(&mut self.params, toml.params);
        Self::merge_pairs(&mut self.header, toml.header);

        // This is outside of fold_in! because SecretBox doesn't implement Eq.
        if self.api_key.is_none() && toml.api_key.is_some() {
            self.api_key = toml.api_key;
        }

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..params,
                ..header,
                ..api_key,

                // Keys with defaults to assign
                verbose: Verbosity::default(),
                base_url: DEFAULT_BASE_URL,
                api_version: DEFAULT_API_VERSION,
                queries_per_second: DEFAULT_MAX_CALLS_PER_PERIOD,
                max_concurrency: DEFAULT_MAX_CONCURRENT,
                max_retries: DEFAULT_RETRY_LIMIT,
                retry_wait_time: DEFAULT_RETRY_BASE_DELAY,
                timeout: DEFAULT_TIMEOUT,
                logical_failure_policy: LogicalFailurePolicy::default(),
                outputs: Vec::<String>::new(),
                user_agent: DEFAULT_USER_AGENT,
                input_format: None,
                output: None,
                format: OutputFormat::default(),
            }
        }
    }

    /// Static query parameters in the order they were given
    pub(crate) fn query_params(&self) -> QueryParams {
        self.params.iter().cloned().collect()
    }
}
