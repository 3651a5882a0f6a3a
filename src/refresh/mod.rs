//! Scheduled reload of the redirect rules from storage.
//!
//! Admin writes update the live set directly; the scheduler covers changes
//! written to the backend by other processes sharing the same storage.

pub mod scheduler;

pub use scheduler::{RefreshScheduler, RefreshStats, SchedulerConfig, SchedulerHandle};
