//! [`WidgetRenderer`] backed by GTK labels

use gtk4::prelude::*;
use gtk4::{GestureClick, Label};
use log::{debug, trace};
use rg_bar_core::{WidgetHandle, WidgetRenderer, WidgetState, CLICKABLE_CLASS};
use std::collections::HashMap;
use std::rc::Rc;

/// Called on the UI thread with the owning module's name
pub type ClickHandler = Rc<dyn Fn(&str)>;

struct RenderedWidget {
    label: Label,
    revision: Option<u64>,
}

/// Keeps one [`Label`] per realized widget inside the bar container
pub struct GtkRenderer {
    container: gtk4::Box,
    widgets: HashMap<u64, RenderedWidget>,
    on_click: ClickHandler,
}

impl GtkRenderer {
    pub fn new(container: gtk4::Box, on_click: ClickHandler) -> Self {
        Self {
            container,
            widgets: HashMap::new(),
            on_click,
        }
    }

    fn apply(label: &Label, state: &WidgetState) {
        label.set_text(&state.text);
        label.set_tooltip_text(state.tooltip.as_deref());
        let classes: Vec<&str> = state.css_classes.iter().map(String::as_str).collect();
        label.set_css_classes(&classes);
        label.set_visible(state.visible);
    }
}

impl WidgetRenderer for GtkRenderer {
    fn realize(&mut self, widget: &WidgetHandle) {
        if self.widgets.contains_key(&widget.id()) {
            return;
        }
        let label = Label::new(None);
        let state = widget.snapshot();

        if state.css_classes.iter().any(|c| c == CLICKABLE_CLASS) {
            let gesture = GestureClick::new();
            gesture.set_button(gtk4::gdk::BUTTON_PRIMARY);
            let on_click = Rc::clone(&self.on_click);
            let owner = widget.owner().to_string();
            gesture.connect_released(move |_, _, _, _| on_click(&owner));
            label.add_controller(gesture);
        }

        Self::apply(&label, &state);
        self.container.append(&label);
        debug!("Realized widget {} for {}", widget.id(), widget.owner());

        self.widgets.insert(
            widget.id(),
            RenderedWidget {
                label,
                revision: Some(state.revision),
            },
        );
    }

    fn render(&mut self, widget: &WidgetHandle) {
        let Some(rendered) = self.widgets.get_mut(&widget.id()) else {
            trace!("Render of unrealized widget {} ignored", widget.id());
            return;
        };
        let state = widget.snapshot();
        if rendered.revision == Some(state.revision) {
            return;
        }
        Self::apply(&rendered.label, &state);
        rendered.revision = Some(state.revision);
    }

    fn release(&mut self, widget: &WidgetHandle) {
        if let Some(rendered) = self.widgets.remove(&widget.id()) {
            self.container.remove(&rendered.label);
            debug!("Released widget {} of {}", widget.id(), widget.owner());
        }
    }
}
