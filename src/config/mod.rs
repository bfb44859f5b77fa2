//! Configuration management

mod settings;

pub use settings::{AppConfig, BarConfig, IpcConfig, ModuleEntry, SchedulerConfig, CONFIG_VERSION};
