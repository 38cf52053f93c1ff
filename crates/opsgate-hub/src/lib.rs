//! In-process pub/sub hubs for lifecycle notifications.
//!
//! Two structurally identical, independently instantiated buses:
//!
//! - [`EventHub`] broadcasts plan/approval/execution state changes, keyed
//!   by session ID (the empty key subscribes to everything);
//! - [`LogHub`] broadcasts execution log lines, keyed by execution ID,
//!   and keeps a bounded history per key so a late subscriber can catch up
//!   before live-tailing.
//!
//! Both hubs guard their state with a single mutex per instance and
//! deliver with a non-blocking send: a slow subscriber only ever loses its
//! own messages, never stalls the publisher or other subscribers.
//! Delivery is at-most-once, best-effort, with no replay.

mod event;
mod event_hub;
mod log_hub;

pub use event::HubEvent;
pub use event_hub::{EventHub, EventSubscription};
pub use log_hub::{LogHub, LogSubscription};
