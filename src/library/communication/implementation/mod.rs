//! Trait implementations for concrete queueing backends

pub mod json;
pub mod memory;
pub mod redis;
