//! `notify` crate — the EventNotifier (C7, spec.md §4.7): fan-out of
//! workflow/task lifecycle events to the per-execution and `visualization`
//! subscriber groups.

pub mod hub;
pub mod payload;

pub use hub::NotifyHub;
pub use payload::Event;
