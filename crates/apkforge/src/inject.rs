use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{InjectConfig, MissingSignature};
use crate::error::{Error, Result};

/// Scan state of one hook pass, threaded through the line loop so nothing
/// leaks across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Inserted,
    SignatureNotFound,
}

/// The injected call site: one static invocation of the bootstrap routine,
/// in smali method-invocation syntax.
pub fn call_line(bootstrap_class: &str) -> String {
    format!("    invoke-static {{}}, L{bootstrap_class};->init()V")
}

/// Locate the entry class disassembly and insert the bootstrap call
/// immediately after the lifecycle method declaration, exactly once.
pub fn inject_entry_hook(tree: &Path, cfg: &InjectConfig) -> Result<HookOutcome> {
    let target = resolve_target(tree, &cfg.entry_candidates)?;
    let input = fs::read_to_string(&target)
        .map_err(|e| Error::Injection(format!("failed to read {}: {e}", target.display())))?;

    let call = call_line(&cfg.bootstrap_class);
    let (patched, outcome) = hook_lines(&input, &cfg.signature, &call);

    if outcome == HookOutcome::SignatureNotFound {
        match cfg.missing_signature {
            MissingSignature::Fail => {
                return Err(Error::Injection(format!(
                    "lifecycle signature '{}' not found in {}",
                    cfg.signature,
                    target.display()
                )));
            }
            MissingSignature::Keep => {
                tracing::warn!(
                    target_file = %target.display(),
                    signature = %cfg.signature,
                    "lifecycle signature not found; leaving entry class unhooked"
                );
            }
        }
    } else {
        tracing::info!(target_file = %target.display(), "entry hook inserted");
    }

    atomic_write(&target, &patched)
        .map_err(|e| Error::Injection(format!("failed to rewrite {}: {e}", target.display())))?;
    Ok(outcome)
}

/// Synthesize the bootstrap class disassembly from the built-in template,
/// creating its package directory first.
pub fn inject_bootstrap_class(tree: &Path, cfg: &InjectConfig) -> Result<()> {
    let rel = format!("smali/{}.smali", cfg.bootstrap_class);
    let path = tree.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Injection(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let smali = bootstrap_template(&cfg.bootstrap_class, cfg.base_dir_export.as_deref());
    atomic_write(&path, &smali)
        .map_err(|e| Error::Injection(format!("failed to write {}: {e}", path.display())))?;
    tracing::info!(class = %cfg.bootstrap_class, "bootstrap class synthesized");
    Ok(())
}

/// First existing candidate wins. apktool splits method-count-heavy apps
/// across numbered smali roots, so the entry class may live under any of them.
fn resolve_target(tree: &Path, candidates: &[String]) -> Result<PathBuf> {
    for rel in candidates {
        let path = tree.join(rel);
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(Error::InjectionTargetNotFound(format!(
        "entry class disassembly absent from all of: {}",
        candidates.join(", ")
    )))
}

/// Single pass over the file. Every segment is copied verbatim; the call line
/// is appended right after the first segment containing the signature. The
/// output is byte-identical to the input when the signature never appears.
fn hook_lines(input: &str, signature: &str, call: &str) -> (String, HookOutcome) {
    let mut out = String::with_capacity(input.len() + call.len() + 2);
    let mut state = HookOutcome::SignatureNotFound;
    for seg in input.split_inclusive('\n') {
        out.push_str(seg);
        if state == HookOutcome::SignatureNotFound && seg.contains(signature) {
            if !seg.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(call);
            out.push('\n');
            state = HookOutcome::Inserted;
        }
    }
    (out, state)
}

/// Smali for the bootstrap class: one public static `init()V` that logs a
/// diagnostic line (and optionally exports the runtime base dir) then
/// returns. Must stay well-formed: nothing verifies the generated file.
fn bootstrap_template(bootstrap_class: &str, base_dir_export: Option<&str>) -> String {
    let simple_name = bootstrap_class.rsplit('/').next().unwrap_or(bootstrap_class);
    let mut smali = format!(
        ".class public L{bootstrap_class};\n\
         .super Ljava/lang/Object;\n\
         .source \"{simple_name}.java\"\n\
         \n\
         .method public static init()V\n\
         \x20   .registers 2\n\
         \x20   const-string v0, \"{simple_name}\"\n\
         \x20   const-string v1, \"bootstrap starting from patched package\"\n\
         \x20   invoke-static {{v0, v1}}, Landroid/util/Log;->d(Ljava/lang/String;Ljava/lang/String;)I\n"
    );
    if let Some(base_dir) = base_dir_export {
        smali.push_str(&format!(
            "    const-string v0, \"{base_dir}\"\n\
             \x20   invoke-static {{v0}}, LStardewModdingAPI/EarlyConstants;->set_AndroidBaseDirPath(Ljava/lang/String;)V\n"
        ));
    }
    smali.push_str("    return-void\n.end method\n");
    smali
}

/// Full-buffer rewrite through a sibling temp file plus rename, so a reader
/// never observes a file truncated mid-write. An existing target keeps its
/// permissions (temp files are created 0600).
fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InjectConfig;

    const SIGNATURE: &str = "onCreate(Landroid/os/Bundle;)V";

    fn entry_smali() -> String {
        [
            ".class public Lcom/chucklefish/stardewvalley/StardewValley;",
            ".super Landroid/app/Activity;",
            "",
            ".method public onCreate(Landroid/os/Bundle;)V",
            "    .registers 3",
            "    invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V",
            "    return-void",
            ".end method",
            "",
        ]
        .join("\n")
    }

    #[test]
    fn inserts_exactly_one_call_after_first_signature_line() {
        let input = entry_smali();
        let call = call_line("com/potatameister/smapi/SmapiNative");
        let (out, outcome) = hook_lines(&input, SIGNATURE, &call);

        assert_eq!(outcome, HookOutcome::Inserted);
        assert_eq!(out.matches(&call).count(), 1);
        assert_eq!(out.lines().count(), input.lines().count() + 1);

        // Positioned immediately after the first occurrence of the signature.
        let lines: Vec<&str> = out.lines().collect();
        let sig_idx = lines.iter().position(|l| l.contains(SIGNATURE)).unwrap();
        assert_eq!(lines[sig_idx + 1], call);
    }

    #[test]
    fn second_signature_match_is_ignored() {
        // The super call carries the same signature substring.
        let input = entry_smali();
        let call = call_line("com/potatameister/smapi/SmapiNative");
        let (out, _) = hook_lines(&input, SIGNATURE, &call);
        let lines: Vec<&str> = out.lines().collect();
        let hook_positions: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("SmapiNative;->init()V"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hook_positions.len(), 1);
        // The declaration comes before the super call; the hook follows it.
        assert!(lines[hook_positions[0] - 1].starts_with(".method"));
    }

    #[test]
    fn missing_signature_leaves_input_byte_identical() {
        let input = ".class public LFoo;\n.method public onPause()V\n.end method";
        let call = call_line("com/potatameister/smapi/SmapiNative");
        let (out, outcome) = hook_lines(input, SIGNATURE, &call);
        assert_eq!(outcome, HookOutcome::SignatureNotFound);
        assert_eq!(out, input);
    }

    #[test]
    fn handles_signature_on_unterminated_last_line() {
        let input = ".method public onCreate(Landroid/os/Bundle;)V";
        let call = call_line("a/B");
        let (out, outcome) = hook_lines(input, SIGNATURE, &call);
        assert_eq!(outcome, HookOutcome::Inserted);
        assert!(out.ends_with(&format!("{call}\n")));
    }

    #[test]
    fn hook_on_disk_rewrites_atomically_and_once() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tree = tmp.path();
        let cfg = InjectConfig::default();
        let rel = &cfg.entry_candidates[0];
        let target = tree.join(rel);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, entry_smali()).unwrap();

        let outcome = inject_entry_hook(tree, &cfg).expect("inject");
        assert_eq!(outcome, HookOutcome::Inserted);
        let patched = fs::read_to_string(&target).unwrap();
        assert_eq!(
            patched.matches("SmapiNative;->init()V").count(),
            1,
            "{patched}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_preserves_target_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let tree = tmp.path();
        let cfg = InjectConfig::default();
        let target = tree.join(&cfg.entry_candidates[0]);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, entry_smali()).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o754)).unwrap();

        inject_entry_hook(tree, &cfg).expect("inject");
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o754);
    }

    #[test]
    fn secondary_candidate_is_used_when_primary_absent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tree = tmp.path();
        let cfg = InjectConfig::default();
        let target = tree.join(&cfg.entry_candidates[1]);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, entry_smali()).unwrap();

        inject_entry_hook(tree, &cfg).expect("inject");
        assert!(fs::read_to_string(&target)
            .unwrap()
            .contains("SmapiNative;->init()V"));
    }

    #[test]
    fn no_candidate_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = inject_entry_hook(tmp.path(), &InjectConfig::default()).unwrap_err();
        assert!(
            matches!(err, Error::InjectionTargetNotFound(_)),
            "unexpected: {err}"
        );
    }

    #[test]
    fn missing_signature_policy_fail_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = InjectConfig::default();
        let target = tmp.path().join(&cfg.entry_candidates[0]);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, ".class public LFoo;\n").unwrap();

        let err = inject_entry_hook(tmp.path(), &cfg).unwrap_err();
        assert!(matches!(err, Error::Injection(_)), "unexpected: {err}");
    }

    #[test]
    fn missing_signature_policy_keep_is_silent_and_lossless() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = InjectConfig {
            missing_signature: MissingSignature::Keep,
            ..InjectConfig::default()
        };
        let original = ".class public LFoo;\n.method public onPause()V\n.end method\n";
        let target = tmp.path().join(&cfg.entry_candidates[0]);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, original).unwrap();

        let outcome = inject_entry_hook(tmp.path(), &cfg).expect("inject");
        assert_eq!(outcome, HookOutcome::SignatureNotFound);
        assert_eq!(fs::read_to_string(&target).unwrap(), original);
    }

    #[test]
    fn bootstrap_template_is_well_formed() {
        let smali = bootstrap_template("com/potatameister/smapi/SmapiNative", None);
        assert!(smali.starts_with(".class public Lcom/potatameister/smapi/SmapiNative;\n"));
        assert!(smali.contains(".super Ljava/lang/Object;"));
        assert!(smali.contains(".method public static init()V"));
        assert!(smali.contains(".registers 2"));
        assert!(smali.contains("Landroid/util/Log;->d(Ljava/lang/String;Ljava/lang/String;)I"));
        assert!(smali.trim_end().ends_with(".end method"));
        // Exactly one method, balanced.
        assert_eq!(smali.matches(".method ").count(), 1);
        assert_eq!(smali.matches(".end method").count(), 1);
    }

    #[test]
    fn bootstrap_template_exports_base_dir_when_set() {
        let smali = bootstrap_template("a/b/Boot", Some("/sdcard/PotataSMAPI"));
        assert!(smali.contains("const-string v0, \"/sdcard/PotataSMAPI\""));
        assert!(smali.contains("set_AndroidBaseDirPath(Ljava/lang/String;)V"));
        let ret = smali.find("return-void").unwrap();
        let export = smali.find("set_AndroidBaseDirPath").unwrap();
        assert!(export < ret);
    }

    #[test]
    fn bootstrap_class_file_lands_in_new_package_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = InjectConfig::default();
        inject_bootstrap_class(tmp.path(), &cfg).expect("inject class");
        let path = tmp
            .path()
            .join("smali/com/potatameister/smapi/SmapiNative.smali");
        let smali = fs::read_to_string(path).unwrap();
        assert!(smali.contains(".method public static init()V"));
    }
}
