//! Event bus for cross-daemon signalling.
//!
//! Daemons never call each other; they publish [`protocol::TaskEvent`]s and
//! react to task-store transitions. The in-process [`event_bus::FlumeBus`]
//! is the default fabric, with per-topic subscriptions keyed on
//! [`protocol::EventKind`]; anything that can deliver a `TaskEvent` can
//! stand in behind the [`event_bus::EventBus`] trait.

pub mod event_bus;
pub mod protocol;

pub use event_bus::{EventBus, FlumeBus, NullBus};
pub use protocol::{EventKind, TaskEvent};
