//! rg-bar-types: Shared data types for the rg-bar status bar framework.
//!
//! This crate contains pure data types (update modes, module configuration,
//! widget handles, retry policies) shared by every rg-bar crate. None of them
//! depend on the UI toolkit or the async runtime.

pub mod module_config;
pub mod retry;
pub mod update_mode;
pub mod widget;

pub use module_config::{ConfigError, ModuleConfig};
pub use retry::RetryPolicy;
pub use update_mode::{UnsupportedModeError, UpdateMode};
pub use widget::{WidgetHandle, WidgetState};
