#![allow(unreachable_pub)]

mod endpoint;
mod error;
mod outcome;
mod params;
mod record;

pub use endpoint::Endpoint;
pub use error::ErrorKind;
pub use outcome::{Failure, Outcome};
pub use params::{ParamValue, QueryParams, OUTPUT_KEY};
pub use record::{Fields, Record};

/// The reach `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
