//! `test-utils` is used for testing in both `reach-lib` and `reach-bin`.
//! This crate does not depend on `reach-lib` or `reach-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock API server, which answers every POST request with a
/// predefined status, optionally customized through `ResponseTemplate`
/// methods, e.g. `mock_api!(200, set_body_string(body))`
#[macro_export]
macro_rules! mock_api {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new($status);
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Mount a POST responder for `/<version>/<endpoint>` on an existing mock
/// server, expecting exactly `$expected` requests
#[macro_export]
macro_rules! mount_endpoint {
    ($server:expr, $path:expr, $responder:expr, $expected:expr $(,)?) => {{
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path($path))
            .respond_with($responder)
            .expect($expected)
            .mount(&$server)
            .await;
    }};
}

/// Get the root path of the project.
#[macro_export]
macro_rules! root_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .to_path_buf()
    };
}

/// Get the path to the `fixtures` directory.
#[macro_export]
macro_rules! fixtures_path {
    () => {
        $crate::root_path!().join("fixtures")
    };
}

/// Loads a fixture from the `fixtures` directory
#[macro_export]
macro_rules! load_fixture {
    ($filename:expr) => {{
        let path = $crate::fixtures_path!().join($filename);
        std::fs::read_to_string(path).unwrap()
    }};
}

/// Build a `{"versium": {"results": [...]}}` response document
#[macro_export]
macro_rules! versium_body {
    ($($result:expr),* $(,)?) => {
        serde_json::json!({ "versium": { "results": [$($result),*] } })
    };
}
