//! Application core: module scheduling and the bar facade

mod bar;
mod update_scheduler;

pub use bar::Bar;
pub use update_scheduler::{SchedulerError, UpdateScheduler};
