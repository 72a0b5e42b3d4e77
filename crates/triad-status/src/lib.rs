//! Publish/subscribe status broadcaster for task, engine, and worker events.
//!
//! Delivery is best-effort and at-most-once per connection, with two
//! exceptions to plain fire-and-forget:
//!
//! - A bounded replay ring of the most recent events is handed to every new
//!   subscriber before live events.
//! - Each subscriber has a bounded queue. On overflow the oldest buffered
//!   events are dropped and a single gap marker is substituted; a slow
//!   consumer is never disconnected for lagging.
//!
//! # Main types
//!
//! - [`StatusBroadcaster`] — the shared publish side.
//! - [`Subscription`] — a filtered, bounded event stream held by one observer.

/// Broadcaster and subscription implementation.
pub mod broadcaster;

pub use broadcaster::{StatusBroadcaster, Subscription};
