//! rg-bar-core: module contract, registry and concurrency plumbing for rg-bar.
//!
//! This crate contains the `Module` trait with its optional capabilities,
//! the explicitly constructed `ModuleRegistry`, the UI-thread task queue that
//! every widget mutation goes through, and the restartable event listeners
//! that drive event-driven modules.

pub mod constants;
mod error;
pub mod listener;
mod module;
mod registry;
mod ui_queue;

pub use constants::{
    CLICKABLE_CLASS, DEFAULT_CHANNEL_CAPACITY, DEFAULT_SOCKET_CHUNK_SIZE, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_UPDATE_INTERVAL,
};
pub use error::{ListenerError, RegistryError, Result, UiError};
pub use listener::{
    callback, noop_callback, EventListener, ListenerCallback, PayloadHandler, SharedListener,
};
pub use module::{
    handles_clicks, handles_ipc, BoxedModule, Clickable, EventSource, FnFactory,
    IpcHandler, Module, ModuleBase, ModuleFactory,
};
pub use registry::{ModuleRegistry, SharedModule};
pub use ui_queue::{ui_channel, UiContext, UiDispatcher, UiLoop, UiTask, WidgetRenderer};

// Re-export types used in trait signatures for convenience
pub use rg_bar_types::{ModuleConfig, RetryPolicy, UpdateMode, WidgetHandle, WidgetState};
