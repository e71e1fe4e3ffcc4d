//! Terminal output for the command-line tool.

pub mod display_mode;
pub mod renderer;

pub use display_mode::DisplayMode;
pub use renderer::{render_live_line, render_results};
