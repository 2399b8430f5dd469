//! `queue` crate — the TriggerLoop (C6, spec.md §4.6): a cron scheduler and
//! a webhook matcher/verifier, both converting external stimuli directly
//! into `Orchestrator::execute` calls. There is no persisted job table here
//! — the workspace's stated Non-goal is "no durable queue of pending
//! executions across restarts," so both halves are in-process loops rather
//! than producers into a queue a separate worker drains.

pub mod baseline;
pub mod error;
pub mod schedule;
pub mod webhook;

pub use baseline::BaselineRefreshLoop;
pub use error::WebhookError;
pub use schedule::ScheduleLoop;
pub use webhook::{SecretResolver, WebhookMatch};
