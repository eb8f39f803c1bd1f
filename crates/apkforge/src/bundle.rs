use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Managed-assembly asset layouts seen in the wild, in resolution order.
const PRIMARY_ASSEMBLY_DIR: &str = "assets/bin/Data/Managed";
const FALLBACK_ASSEMBLY_DIR: &str = "assets/assemblies";

/// Copy the runtime payloads into the package's assembly asset directory.
/// A payload missing from `payload_dir` degrades to a zero-length placeholder
/// so the package keeps its structural shape; only destination I/O fails the
/// stage. Copies truncate, so repeat runs converge to the same bytes.
pub fn bundle(tree: &Path, payload_dir: &Path, names: &[String]) -> Result<Vec<PathBuf>> {
    let dest_dir = resolve_assembly_dir(tree)?;
    let mut written = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let src = payload_dir.join(name);
        let dest = dest_dir.join(name);
        // Read the source in full first: any source-side failure (missing,
        // unreadable, not a regular file) degrades to a placeholder. Only
        // destination writes can fail the stage.
        match fs::read(&src) {
            Ok(bytes) => {
                fs::write(&dest, &bytes).map_err(|e| {
                    Error::Bundle(format!(
                        "failed to write payload to {}: {e}",
                        dest.display()
                    ))
                })?;
                tracing::info!(payload = name, dest = %dest.display(), "payload bundled");
            }
            Err(e) => {
                // Not every build configuration ships every payload.
                fs::File::create(&dest).map_err(|e| {
                    Error::Bundle(format!(
                        "failed to create placeholder {}: {e}",
                        dest.display()
                    ))
                })?;
                tracing::warn!(
                    payload = name,
                    source = %src.display(),
                    error = %e,
                    "payload source unreadable; wrote empty placeholder"
                );
            }
        }
        written.push(dest);
    }
    Ok(written)
}

fn resolve_assembly_dir(tree: &Path) -> Result<PathBuf> {
    let primary = tree.join(PRIMARY_ASSEMBLY_DIR);
    if primary.is_dir() {
        return Ok(primary);
    }
    let fallback = tree.join(FALLBACK_ASSEMBLY_DIR);
    if fallback.is_dir() {
        return Ok(fallback);
    }
    fs::create_dir_all(&primary).map_err(|e| {
        Error::Bundle(format!(
            "failed to create assembly dir {}: {e}",
            primary.display()
        ))
    })?;
    Ok(primary)
}
