use std::fs;
use std::path::Path;

use crate::config::BrandConfig;
use crate::error::{Error, Result};

/// Launcher icon resource names worth replacing.
const ICON_NAMES: [&str; 5] = [
    "ic_launcher",
    "icon",
    "app_icon",
    "ic_launcher_round",
    "ic_launcher_foreground",
];

/// Adaptive-icon XMLs are forced to a simple bitmap form so the replacement
/// PNG actually shows up.
const SIMPLE_ICON_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<adaptive-icon xmlns:android=\"http://schemas.android.com/apk/res/android\">\n\
\x20   <background android:drawable=\"@android:color/black\"/>\n\
\x20   <foreground android:drawable=\"@mipmap/ic_launcher\"/>\n\
</adaptive-icon>\n";

/// Apply the configured rebranding to the decompiled tree.
pub fn apply(tree: &Path, cfg: &BrandConfig) -> Result<()> {
    if !cfg.enabled {
        return Ok(());
    }
    if let (Some(from), Some(to)) = (cfg.rename_from.as_deref(), cfg.rename_to.as_deref()) {
        rename_package(tree, from, to)?;
    }
    if let Some(icon) = cfg.icon.as_deref() {
        replace_icons(tree, Path::new(icon))?;
    }
    Ok(())
}

/// Rewrite the package id inside the binary manifest by same-length byte
/// substitution, for both the UTF-8 and UTF-16LE encodings the format uses.
/// The length constraint is what keeps the binary structure intact.
pub fn rename_package(tree: &Path, from: &str, to: &str) -> Result<()> {
    if from.len() != to.len() {
        return Err(Error::Config(format!(
            "package rename requires equal byte lengths ('{from}' is {}, '{to}' is {})",
            from.len(),
            to.len()
        )));
    }
    let manifest = tree.join("AndroidManifest.xml");
    if !manifest.is_file() {
        return Ok(());
    }
    let mut bytes = fs::read(&manifest)
        .map_err(|e| Error::Brand(format!("failed to read {}: {e}", manifest.display())))?;

    replace_bytes(&mut bytes, from.as_bytes(), to.as_bytes());
    let from_utf16: Vec<u8> = from.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let to_utf16: Vec<u8> = to.encode_utf16().flat_map(u16::to_le_bytes).collect();
    replace_bytes(&mut bytes, &from_utf16, &to_utf16);

    fs::write(&manifest, bytes)
        .map_err(|e| Error::Brand(format!("failed to write {}: {e}", manifest.display())))?;
    tracing::info!(from, to, "package id rewritten in binary manifest");
    Ok(())
}

/// Walk `res/` and swap every known launcher icon for the configured image.
pub fn replace_icons(tree: &Path, icon: &Path) -> Result<()> {
    let res_dir = tree.join("res");
    if !res_dir.is_dir() {
        return Ok(());
    }
    let icon_bytes = fs::read(icon)
        .map_err(|e| Error::Brand(format!("failed to read icon {}: {e}", icon.display())))?;

    for entry in walkdir::WalkDir::new(&res_dir) {
        let entry = entry.map_err(|e| Error::Brand(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if !ICON_NAMES.contains(&stem) {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "webp" => {
                fs::write(path, &icon_bytes).map_err(|e| {
                    Error::Brand(format!("failed to patch {}: {e}", path.display()))
                })?;
                tracing::debug!(resource = %path.display(), "icon replaced");
            }
            "xml" => {
                let text = fs::read_to_string(path).map_err(|e| {
                    Error::Brand(format!("failed to read {}: {e}", path.display()))
                })?;
                if text.contains("adaptive-icon") {
                    fs::write(path, SIMPLE_ICON_XML).map_err(|e| {
                        Error::Brand(format!("failed to patch {}: {e}", path.display()))
                    })?;
                    tracing::debug!(resource = %path.display(), "adaptive icon simplified");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// In-place replacement of every non-overlapping occurrence. `old` and `new`
/// must have equal length; callers enforce that.
fn replace_bytes(buf: &mut [u8], old: &[u8], new: &[u8]) {
    debug_assert_eq!(old.len(), new.len());
    if old.is_empty() || buf.len() < old.len() {
        return;
    }
    let mut i = 0;
    while i <= buf.len() - old.len() {
        if &buf[i..i + old.len()] == old {
            buf[i..i + old.len()].copy_from_slice(new);
            i += old.len();
        } else {
            i += 1;
        }
    }
}
