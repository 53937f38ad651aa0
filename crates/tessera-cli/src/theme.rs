//! CLI theme and styling.

use colored::Colorize;
use tessera_ledger::{ContentHash, StatusState};

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(72).dimmed().to_string()
    }

    /// Format a key-value pair.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("{}: {}", key.bold(), value)
    }

    /// Format an authority status.
    pub(crate) fn state(state: StatusState) -> String {
        match state {
            StatusState::Pending => state.as_str().yellow().to_string(),
            StatusState::Accepted => state.as_str().green().to_string(),
            StatusState::Rejected => state.as_str().red().to_string(),
            StatusState::Error => state.as_str().red().bold().to_string(),
        }
    }

    /// Format a hash (shortened).
    pub(crate) fn hash(hash: &ContentHash) -> String {
        format!("{}", hash.short().cyan())
    }

    /// Format a timestamp.
    pub(crate) fn timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string().dimmed().to_string()
    }
}
