use std::net::TcpListener;

use http::{HeaderMap, HeaderValue};
use reqwest::Url;

use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::{Fields, Record};

/// Build record fields from name/value pairs
pub(crate) fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Some((*v).to_string())))
        .collect()
}

/// Build a record at `index` from name/value pairs
pub(crate) fn record(index: usize, pairs: &[(&str, &str)]) -> Record {
    Record::new(index, fields(pairs))
}

/// Dispatcher against a mock server at `uri`, using API version `v2`
pub(crate) fn dispatcher(uri: &str, config: DispatchConfig) -> Dispatcher {
    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("application/json"));
    Dispatcher::new(
        reqwest::Client::new(),
        Url::parse(uri).expect("Expected valid mock server URL"),
        "v2".to_string(),
        headers,
        config,
    )
}

/// First value of the query parameter `key` of a request received by a mock server
pub(crate) fn query_value(request: &wiremock::Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// URL of a local port nothing listens on
pub(crate) fn unreachable_uri() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Expected a free local port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
