//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available before a
//! batch starts, so a misconfiguration aborts before any item is touched.

use crate::config::Settings;
use crate::error::{PodsiftError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A batch run needs the feed, the credential and ffmpeg.
    Run,
    /// Regenerating the report works from stored artifacts only.
    Report,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Run => {
            settings.validate()?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
        }
        Operation::Report => {}
    }
    Ok(())
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("-version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(PodsiftError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PodsiftError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(PodsiftError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

/// Platform-specific install hint for ffmpeg tools.
pub fn install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_has_no_requirements() {
        assert!(check(Operation::Report, &Settings::default()).is_ok());
    }

    #[test]
    fn test_run_requires_feed() {
        let err = check(Operation::Run, &Settings::default()).unwrap_err();
        assert!(matches!(err, PodsiftError::Config(_)));
    }

    #[test]
    fn test_missing_tool() {
        let err = check_tool("podsift-no-such-tool").unwrap_err();
        assert!(matches!(err, PodsiftError::ToolNotFound(_)));
    }

    #[test]
    fn test_install_hint_mentions_ffmpeg() {
        assert!(install_hint().contains("ffmpeg"));
    }
}
