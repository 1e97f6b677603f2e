//! In-process implementation of the queueing traits
//!
//! Implements the full claim/ack/reclaim protocol on a heap-allocated log with
//! the same semantics as the redis streams implementation: per-group delivery
//! cursors, a pending entry list with claim timestamps and delivery counters,
//! and length-bounded retention. Used by tests and single-process deployments.

mod log;

pub use log::*;
