//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Stylesheet for operator-facing messages on stderr.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success marks and built targets (green)
    pub success: Style,
    /// Warnings and unbuilt targets (yellow)
    pub warning: Style,
    /// Progress steps (blue)
    pub info: Style,
    /// Project headers
    pub header: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.info = Style::new().blue();
        self.header = Style::new().bold().cyan();
    }
}
