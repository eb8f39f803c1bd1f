use std::path::Path;

use crate::error::{Error, Result};
use crate::tool::{ExternalTool, ToolError};

/// Decompile the package into an editable tree. Force mode fully overwrites a
/// pre-existing tree, so retries start from a known state.
pub fn extract(tool: &ExternalTool, source_apk: &Path, out_tree: &Path) -> Result<()> {
    if !source_apk.is_file() {
        return Err(Error::Extraction(format!(
            "source package {} not found",
            source_apk.display()
        )));
    }
    tracing::info!(source = %source_apk.display(), "decompiling package");
    tool.run(&[
        "d".as_ref(),
        source_apk.as_os_str(),
        "-o".as_ref(),
        out_tree.as_os_str(),
        "-f".as_ref(),
    ])
    .map_err(|e| match e {
        ToolError::Timeout(secs) => Error::Timeout {
            stage: "extract",
            secs,
        },
        other => Error::Extraction(format!("{} d: {other}", tool.program())),
    })
}

/// Re-serialize the editable tree into an unsigned package.
pub fn build(tool: &ExternalTool, tree: &Path, out_apk: &Path) -> Result<()> {
    tracing::info!(out = %out_apk.display(), "rebuilding package");
    tool.run(&[
        "b".as_ref(),
        tree.as_os_str(),
        "-o".as_ref(),
        out_apk.as_os_str(),
    ])
    .map_err(|e| match e {
        ToolError::Timeout(secs) => Error::Timeout {
            stage: "rebuild",
            secs,
        },
        other => Error::Rebuild(format!("{} b: {other}", tool.program())),
    })
}
