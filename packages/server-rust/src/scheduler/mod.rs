//! Periodic scheduler.
//!
//! - [`entry`]: schedule modes, time fields and jitter
//! - [`service`]: the deduplicated entry set and its tick task

pub mod entry;
pub mod service;

pub use entry::{ScheduleMode, SchedulerError, TimeField, TimeSpec};
pub use service::{Scheduler, SCHEDULER_SERVICE};
