//! In-memory request store and notification hub.
//!
//! [`RequestStore`] owns the canonical copy of every request and is the
//! single authority for status transitions. Each transition is broadcast to
//! matching [`Subscription`]s through the [`NotificationHub`].

pub mod error;
pub mod hub;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use hub::{NotificationHub, RequestEvent, Subscription, SubscriptionCloser, SubscriptionId};
pub use store::RequestStore;
