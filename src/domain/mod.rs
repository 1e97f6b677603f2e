//! Domain specific structures, implementations, and logic

/// Default queue size for the event delivery log
///
/// It should hold a number of items that equals the maximum reasonable backlog
/// that may accumulate while every worker is down. Entries beyond this limit
/// are evicted oldest-first and can no longer be delivered.
pub(self) const QUEUE_SIZE_EVENT_LOG: usize = 10_000;

mod error;
mod event;
mod result;

pub mod downtime;

pub use error::*;
pub use event::*;
pub use result::*;
