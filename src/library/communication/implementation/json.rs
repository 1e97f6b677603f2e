//! Serialization and deserialization provided by [`serde_json`] using marker traits
//!
//! This module allows implementors of traits that allow raw access to underlying messaging
//! systems to provide the higher-level traits relying on serialization. It does so by
//! providing a marker trait which, when implemented, provides a default implementation of
//! the higher-level trait by translating between lower-level serialized data and
//! strongly typed data using [`serde_json`].

use super::super::event::{QueueEntry, RawQueueEntry};
use crate::library::BoxedError;
use serde::Deserialize;

/// Marker trait providing a default [`QueueEntry`] implementation based on [`serde_json`]
pub trait JsonQueueEntry: RawQueueEntry {}

impl<E> QueueEntry for E
where
    E: JsonQueueEntry,
{
    /// Parses the payload using [`serde_json::from_slice`]
    fn parse_payload<'a, T>(&'a self) -> Result<T, BoxedError>
    where
        T: Deserialize<'a>,
    {
        serde_json::from_slice(self.payload()).map_err(Into::into)
    }
}
