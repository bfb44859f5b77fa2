//! Socket feed module
//!
//! EventDriven. Connects to a Unix domain socket and shows the most recent
//! payload written to it. The connection is owned by a [`SocketListener`]
//! that the registry starts and stops.

use anyhow::{anyhow, Result};
use rg_bar_core::listener::{Framing, SocketListener};
use rg_bar_core::{EventListener, EventSource, Module, ModuleBase, SharedListener};
use rg_bar_core::DEFAULT_SOCKET_CHUNK_SIZE;
use rg_bar_types::{ModuleConfig, RetryPolicy, UpdateMode, WidgetHandle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFraming {
    #[default]
    Lines,
    Chunks,
}

fn default_chunk_size() -> usize {
    DEFAULT_SOCKET_CHUNK_SIZE
}

fn default_format() -> String {
    "{payload}".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFeedOptions {
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub framing: FeedFraming,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// `{payload}` is replaced with the latest payload
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for SocketFeedOptions {
    fn default() -> Self {
        Self {
            socket_path: None,
            framing: FeedFraming::default(),
            chunk_size: default_chunk_size(),
            retry: RetryPolicy::default(),
            format: default_format(),
        }
    }
}

pub struct SocketFeedModule {
    base: ModuleBase,
    options: SocketFeedOptions,
    latest: Arc<Mutex<String>>,
    listener: Option<Arc<SocketListener>>,
}

impl SocketFeedModule {
    pub fn new() -> Self {
        Self {
            base: ModuleBase::new("socket_feed", UpdateMode::EventDriven),
            options: SocketFeedOptions::default(),
            latest: Arc::new(Mutex::new(String::new())),
            listener: None,
        }
    }

    /// Last payload received
    pub fn latest(&self) -> String {
        self.latest
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn framing(&self) -> Framing {
        match self.options.framing {
            FeedFraming::Lines => Framing::Lines,
            FeedFraming::Chunks => Framing::Chunks(self.options.chunk_size),
        }
    }
}

impl Default for SocketFeedModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for SocketFeedModule {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_mode(&self) -> UpdateMode {
        self.base.mode()
    }

    fn create_widget(&mut self) -> Result<WidgetHandle> {
        let widget = self.base.new_widget();
        self.update_widget(&widget)?;
        Ok(widget)
    }

    fn update_widget(&mut self, widget: &WidgetHandle) -> Result<()> {
        let text = self.options.format.replace("{payload}", &self.latest());
        widget.set_text(text);
        Ok(())
    }

    fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        let options: SocketFeedOptions = config.options_as()?;
        if options.socket_path.is_none() {
            return Err(anyhow!("socket_feed requires a socket_path"));
        }
        if options.chunk_size == 0 {
            return Err(anyhow!("socket_feed chunk_size must be greater than zero"));
        }
        self.options = options;
        self.base.initialize(config)
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            listener.cleanup()?;
        }
        Ok(())
    }

    fn styles(&self) -> Option<&str> {
        self.base.styles()
    }

    fn css_classes(&self) -> &[String] {
        self.base.css_classes()
    }

    fn as_event_source(&mut self) -> Option<&mut dyn EventSource> {
        Some(self)
    }
}

impl EventSource for SocketFeedModule {
    fn setup_event_listeners(&mut self) -> Result<Vec<SharedListener>> {
        let path = self
            .options
            .socket_path
            .clone()
            .ok_or_else(|| anyhow!("socket_feed is not initialized"))?;
        if let Some(previous) = self.listener.take() {
            previous.stop();
        }

        let latest = Arc::clone(&self.latest);
        let listener = Arc::new(
            SocketListener::new(
                self.base.name(),
                path,
                Arc::new(move |payload| match latest.lock() {
                    Ok(mut slot) => *slot = payload,
                    Err(e) => *e.into_inner() = payload,
                }),
            )
            .with_policy(self.options.retry)
            .with_framing(self.framing()),
        );
        self.listener = Some(Arc::clone(&listener));
        Ok(vec![listener as SharedListener])
    }
}
