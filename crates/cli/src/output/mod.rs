//! Output formatting for human-readable and JSON modes

mod formatter;

pub use formatter::{Formatter, format_size};

/// Output settings shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Emit JSON instead of text; disables colors and progress
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
