//! Display mode detection.
//!
//! Determines whether to render live progress, stay silent, or emit JSON
//! based on CLI flags and terminal capabilities.

/// The display mode for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Live progress line on stderr, colored results on stdout
    Live,
    /// No progress output, colored results only
    Silent,
    /// JSON mode - structured output only
    Json,
}

impl DisplayMode {
    /// Determine display mode from CLI flags and environment.
    ///
    /// # Arguments
    /// * `json_flag` - Whether the `--json` flag was provided
    /// * `is_tty` - Whether stdout is a TTY (interactive terminal)
    ///
    /// # Returns
    /// * `Json` when json_flag is true (regardless of is_tty)
    /// * `Live` when json_flag is false AND is_tty is true
    /// * `Silent` when json_flag is false AND is_tty is false
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty {
            DisplayMode::Live
        } else {
            DisplayMode::Silent
        }
    }

    /// Whether live state updates should be rendered.
    pub fn shows_progress(&self) -> bool {
        *self == DisplayMode::Live
    }
}
