use crate::library::BoxedError;
use thiserror::Error;

/// Fault raised by a processor while handling a single event
///
/// The variant decides what happens to the claimed log entry: transient faults
/// leave it unacknowledged so it gets redelivered after the claim expires,
/// terminal faults are recorded as a permanent outcome and acknowledged.
#[derive(Debug, Error)]
pub enum ProcessingFailure {
    /// Retryable fault caused by the environment, not the event itself
    #[error("transient fault while processing event")]
    Transient(#[source] BoxedError),

    /// Fault inherent to the event, retrying can not fix it
    #[error("permanent fault while processing event: {0}")]
    Terminal(String),
}
