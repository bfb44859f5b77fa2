//! Toolkit-neutral widget handle
//!
//! Modules never touch toolkit objects directly. They mutate the
//! [`WidgetState`] behind a [`WidgetHandle`] while running on the UI thread,
//! and the toolkit renderer copies that state onto the real widget right after.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// Displayable state of a module's widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetState {
    pub text: String,
    pub tooltip: Option<String>,
    pub css_classes: Vec<String>,
    pub visible: bool,
    /// Bumped on every mutation so renderers can skip unchanged widgets
    pub revision: u64,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            text: String::new(),
            tooltip: None,
            css_classes: Vec::new(),
            visible: true,
            revision: 0,
        }
    }
}

/// Opaque, cloneable handle to a module's widget
#[derive(Clone)]
pub struct WidgetHandle {
    id: u64,
    owner: Arc<str>,
    state: Arc<RwLock<WidgetState>>,
}

impl WidgetHandle {
    /// Allocate a new handle owned by the named module
    pub fn new(owner: &str) -> Self {
        Self {
            id: NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed),
            owner: Arc::from(owner),
            state: Arc::new(RwLock::new(WidgetState::default())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the module that created this widget
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> WidgetState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a mutation and bump the revision
    pub fn update<R>(&self, f: impl FnOnce(&mut WidgetState) -> R) -> R {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => {
                log::warn!("Widget {} state lock poisoned, recovering", self.id);
                poisoned.into_inner()
            }
        };
        let result = f(&mut state);
        state.revision = state.revision.wrapping_add(1);
        result
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|state| state.text = text);
    }

    pub fn set_tooltip(&self, tooltip: Option<String>) {
        self.update(|state| state.tooltip = tooltip);
    }

    pub fn set_css_classes(&self, classes: &[String]) {
        self.update(|state| state.css_classes = classes.to_vec());
    }

    pub fn set_visible(&self, visible: bool) {
        self.update(|state| state.visible = visible);
    }

    pub fn text(&self) -> String {
        self.snapshot().text
    }

    pub fn revision(&self) -> u64 {
        self.snapshot().revision
    }
}

impl PartialEq for WidgetHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WidgetHandle {}

impl Hash for WidgetHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetHandle")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}
