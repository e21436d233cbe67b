//! `reach` appends data from the Versium Reach API to a batch of records.
//!
//! The reach binary is a wrapper around reach-lib, which runs the queries
//! concurrently while staying within the rate limit of the API.
//!
//! Append contact information to the records of a CSV file:
//! ```sh
//! REACH_API_KEY=... reach contact records.csv
//! ```
//!
//! Request specific outputs and write the outcomes to a file:
//! ```sh
//! reach demographic records.jsonl --outputs financial,lifestyle -o outcomes.jsonl
//! ```
//!
//! Read JSON lines from standard input and print a human-readable summary:
//! ```sh
//! cat records.jsonl | reach firmographic - --format compact
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{crate_version, Parser};
use http::HeaderMap;
use log::{error, info, warn};
#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

use reach_lib::{CancellationToken, Client, ClientBuilder, Endpoint, Outcome};

mod input;
mod logging;
mod options;
mod verbosity;
mod writer;

use crate::logging::init_logging;
use crate::options::{Config, HeaderMapExt, ReachOptions, REACH_CONFIG_FILE};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator. This includes unknown endpoints, invalid rate
    // limits and unreadable input files.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RecordFailure = 2,
    ConfigFile = 3,
    Interrupted = 130,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<ReachOptions> {
    let mut opts = ReachOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, a `reach.toml` in the current
        // directory is used if present. An invalid one is still an error.
        let default_config = PathBuf::from(REACH_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Create the API client from the merged configuration
fn build_client(cfg: &Config) -> Result<Client> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    let client = ClientBuilder::builder()
        .api_key(cfg.api_key.clone())
        .base_url(cfg.base_url.clone())
        .api_version(cfg.api_version.clone())
        .queries_per_second(cfg.queries_per_second)
        .max_concurrency(cfg.max_concurrency)
        .max_retries(cfg.max_retries)
        .retry_wait_time(cfg.retry_wait_time)
        .timeout(cfg.timeout)
        .logical_failure_policy(cfg.logical_failure_policy)
        .custom_headers(headers)
        .user_agent(cfg.user_agent.clone())
        .build()
        .client()?;

    Ok(client)
}

/// Set up runtime and call reach entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!(
                "Error while loading config: {e}\n\
                See: https://github.com/VersiumAnalytics/reach-api-python-sdk (reach v{})",
                crate_version!()
            );
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(&opts))
}

/// Run all records of the input through the endpoint
async fn run(opts: &ReachOptions) -> Result<i32> {
    let cfg = &opts.config;

    let endpoint = Endpoint::parse(&opts.endpoint)?;
    let client = build_client(cfg)?;
    let records = input::read_records(&opts.input, cfg.input_format)?;

    let outputs: Vec<&str> = if cfg.outputs.is_empty() {
        endpoint.default_outputs().to_vec()
    } else {
        cfg.outputs.iter().map(String::as_str).collect()
    };

    info!(
        "Appending {} record(s) via `{endpoint}` with outputs [{}]",
        records.len(),
        outputs.join(", ")
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcomes = match client
        .append_until_cancelled(
            &endpoint.to_string(),
            records,
            &outputs,
            cfg.query_params(),
            &cancel,
        )
        .await
    {
        Ok(outcomes) => outcomes,
        Err(e) if e.is_cancelled() => {
            warn!("Interrupted; no outcomes were written");
            return Ok(ExitCode::Interrupted as i32);
        }
        Err(e) => return Err(e.into()),
    };

    writer::write_outcomes(&outcomes, cfg.format, cfg.output.as_deref())?;

    Ok(exit_code(&outcomes) as i32)
}

fn exit_code(outcomes: &[Outcome]) -> ExitCode {
    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed == 0 {
        ExitCode::Success
    } else {
        warn!("{failed} of {} record(s) failed", outcomes.len());
        ExitCode::RecordFailure
    }
}
