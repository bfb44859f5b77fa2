//! rg-bar: a modular status bar for Linux
//!
//! This library provides the application layer of rg-bar:
//! - The update scheduler that drives Static, Periodic, EventDriven and
//!   OnDemand modules
//! - The bar facade tying the module registry, scheduler and UI queue together
//! - Configuration management
//! - The inbound message socket
//! - The GTK renderer for module widgets

pub mod config;
pub mod core;
pub mod ipc;
pub mod ui;

// Re-export commonly used types
pub use config::AppConfig;
pub use core::{Bar, SchedulerError, UpdateScheduler};
