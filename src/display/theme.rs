//! Terminal styling for CLI messages.
//!
//! Colors are dropped when `NO_COLOR` is set or the target stream is not a
//! terminal, so piped `--json` output and redirected logs stay plain.

use console::Style;
use is_terminal::IsTerminal;
use std::sync::LazyLock;

pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Styles used by the CLI.
#[derive(Debug, Clone)]
pub struct Theme {
    pub error: Style,
    pub warning: Style,
    pub header: Style,
    pub dim: Style,
    /// Snapshot paths in `info` output
    pub path: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            path: Style::new().magenta(),
        }
    }
}

impl Theme {
    /// `✗ message`, for stderr.
    pub fn error_line(&self, text: &str) -> String {
        let colored = colors_enabled(std::io::stderr().is_terminal());
        marked("✗", &self.error, text, colored)
    }

    /// `⚠ message`, for stderr.
    pub fn warning_line(&self, text: &str) -> String {
        let colored = colors_enabled(std::io::stderr().is_terminal());
        marked("⚠", &self.warning, text, colored)
    }

    /// Style `text` for stdout.
    pub fn paint<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if colors_enabled(std::io::stdout().is_terminal()) {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn colors_enabled(is_terminal: bool) -> bool {
    is_terminal && std::env::var_os("NO_COLOR").is_none()
}

fn marked(icon: &str, style: &Style, text: &str, colored: bool) -> String {
    if colored {
        format!("{} {}", style.apply_to(icon), style.apply_to(text))
    } else {
        format!("{icon} {text}")
    }
}
