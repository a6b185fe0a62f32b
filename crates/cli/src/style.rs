//! Shared styling utilities for terminal output.

use console::Style;

use branchwatch_core::conflict::Severity;
use branchwatch_core::BranchStatus;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Coloured glyph plus label for a branch status.
pub fn status(status: BranchStatus) -> String {
    let (glyph, style) = match status {
        BranchStatus::Active => ("●", Style::new().green()),
        BranchStatus::Completed => ("✓", Style::new().blue()),
        BranchStatus::Abandoned => ("○", Style::new().dim()),
    };
    format!("{} {}", style.apply_to(glyph), status)
}

pub fn severity(severity: Severity) -> String {
    let style = match severity {
        Severity::None => Style::new().green(),
        Severity::Conflict => Style::new().red().bold(),
        Severity::Unknown => Style::new().yellow(),
    };
    style.apply_to(severity.to_string()).to_string()
}
