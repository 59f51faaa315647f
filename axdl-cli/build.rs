//! Build script for axdl-cli: auto-configures git hooks.

use std::process::Command;

/// Auto-configure git hooks and other build-time setup.
fn main() {
    if std::path::Path::new("../.githooks").exists() || std::path::Path::new(".githooks").exists() {
        let _ = Command::new("git")
            .args(["config", "core.hooksPath", ".githooks"])
            .status();
    }
}
