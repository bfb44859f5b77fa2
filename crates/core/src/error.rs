//! Error types for the registry, the UI queue and event listeners

use rg_bar_types::ConfigError;
use thiserror::Error;

/// Failures reported by the UI task queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UiError {
    /// The UI loop has been dropped and no longer drains tasks
    #[error("UI loop is not running")]
    Closed,

    /// The task panicked while running on the UI thread
    #[error("UI task panicked: {0}")]
    Panicked(String),
}

/// Failures reported by event listeners
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Listener {0} is already running")]
    AlreadyRunning(String),

    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to subscribe to {target}: {source}")]
    Subscribe {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener {0} must be started inside a tokio runtime")]
    NoRuntime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by [`ModuleRegistry`](crate::ModuleRegistry)
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Factory already registered: {0}")]
    DuplicateFactory(String),

    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Unknown factory: {0}")]
    UnknownFactory(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid configuration for {name}: {source}")]
    InvalidConfig {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("Factory {name} failed: {source}")]
    Factory {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to initialize module {name}: {source}")]
    Initialization {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Module {name} failed: {source}")]
    Module {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Listener error for module {name}: {source}")]
    Listener {
        name: String,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Ui(#[from] UiError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl RegistryError {
    /// True when the failure came from a panic on the UI thread
    pub fn is_panic(&self) -> bool {
        matches!(self, RegistryError::Ui(UiError::Panicked(_)))
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
