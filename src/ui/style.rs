//! Bar stylesheet

use gtk4::gdk::Display;
use gtk4::CssProvider;

/// Built-in look; user and module CSS are layered on top
pub const BASE_CSS: &str = "
window.rg-bar {
    background-color: rgba(20, 20, 24, 0.92);
    color: #e0e0e0;
}

label.module {
    padding: 0 6px;
}

label.warning {
    color: #ffb347;
}
";

/// Join the base, user and per-module stylesheets in cascade order
pub fn compose_stylesheet<'a>(
    user: Option<&str>,
    modules: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut css = String::from(BASE_CSS);
    for chunk in user.into_iter().chain(modules) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        css.push('\n');
        css.push_str(chunk);
        css.push('\n');
    }
    css
}

/// Install `css` for the whole display
///
/// Returns the provider so a later call can replace it.
pub fn apply_stylesheet(css: &str, previous: Option<&CssProvider>) -> Option<CssProvider> {
    let display = Display::default()?;
    if let Some(previous) = previous {
        gtk4::style_context_remove_provider_for_display(&display, previous);
    }
    let provider = CssProvider::new();
    provider.load_from_data(css);
    gtk4::style_context_add_provider_for_display(
        &display,
        &provider,
        gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
    Some(provider)
}
