//! Structures to communicate with the durable log backing the pipeline
//!
//! Events submitted to the pipeline are published as [`Notifications`](event::Notification)
//! onto an append-only, length-bounded queue. Competing consumers claim entries through
//! [consumer groups](event::ConsumerGroupDescriptor), process them and acknowledge them.
//! Claims that are not acknowledged within a timeout can be reclaimed by other consumers
//! which provides at-least-once delivery across consumer crashes.
//!
//! The concrete queueing technology is hidden behind the [`QueueProvider`](event::QueueProvider)
//! and [`NotificationPublisher`](event::NotificationPublisher) traits. Implementations are
//! provided for Redis Streams and an in-process log, instantiated through a
//! [`CommunicationFactory`].

mod communication_factory;

pub mod event;
pub mod implementation;

pub use communication_factory::CommunicationFactory;
