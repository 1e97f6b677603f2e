//! Helper functions that don't belong elsewhere

mod backoff;
mod healthcheck;

pub use backoff::Backoff;
pub use healthcheck::wait_for;

use std::num::ParseIntError;
use std::time::Duration;

/// Parses a [`Duration`] from a string containing seconds.
/// Useful for command line parsing
pub fn parse_seconds(src: &str) -> Result<Duration, ParseIntError> {
    let seconds = src.parse::<u64>()?;
    Ok(Duration::from_secs(seconds))
}

/// Parses a [`Duration`] from a string containing milliseconds.
/// Useful for command line parsing
pub fn parse_millis(src: &str) -> Result<Duration, ParseIntError> {
    let millis = src.parse::<u64>()?;
    Ok(Duration::from_millis(millis))
}
