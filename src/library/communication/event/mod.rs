//! Structures to realise reliable, competing-consumer event delivery
//!
//! Events are appended to a [`Queue`](QueueDescriptor) as [`Notifications`](Notification),
//! a log-like data structure of limited length where old elements are evicted. Consumers
//! join a [`ConsumerGroup`](ConsumerGroupDescriptor) in which every entry is delivered to
//! exactly one member at a time. Delivery constitutes a *claim*: temporary ownership which
//! has to be confirmed by acknowledging the entry once processing concluded.
//!
//! When a consumer crashes mid-processing, its claims are never acknowledged. After a
//! configurable idle period such entries become eligible for
//! [reclamation](QueueProvider::reclaim) by any other group member, which redelivers them
//! with an incremented delivery count. Together with idempotent processing on the consumer
//! side this yields effectively-once processing on top of at-least-once delivery.
//!
//! Within a single queue, unclaimed entries are always handed out in append order.
//! No ordering guarantees exist across different queues.

mod consumer;
mod consumer_group;
mod notification;
mod publisher;
mod queue;
mod queue_provider;

pub use consumer::*;
pub use consumer_group::*;
pub use notification::*;
pub use publisher::*;
pub use queue::*;
pub use queue_provider::*;
