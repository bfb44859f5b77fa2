//! GTK front end: renders module widgets as labels in the bar

mod renderer;
mod style;

pub use renderer::{ClickHandler, GtkRenderer};
pub use style::{apply_stylesheet, compose_stylesheet, BASE_CSS};
