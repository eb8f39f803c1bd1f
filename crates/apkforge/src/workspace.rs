use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Derived per-job artifact paths. Each stage consumes the previous stage's
/// output path; nothing outside the job root is ever written.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub root: PathBuf,
    /// Working copy of the input package.
    pub source_apk: PathBuf,
    /// Decompiled tree mutated by the injector and bundler.
    pub tree_dir: PathBuf,
    pub unsigned_apk: PathBuf,
    pub signed_apk: PathBuf,
}

pub fn job_paths(root: &Path) -> JobPaths {
    JobPaths {
        root: root.to_path_buf(),
        source_apk: root.join("base_game.apk"),
        tree_dir: root.join("decompiled"),
        unsigned_apk: root.join("unsigned.apk"),
        signed_apk: root.join("signed.apk"),
    }
}

/// Job ids key workspace roots so concurrent jobs cannot collide.
pub fn new_job_id() -> String {
    format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        std::process::id()
    )
}

/// Guarantee an empty job root: any pre-existing subtree is removed in full
/// before the root is recreated. A failed removal fails the job instead of
/// claiming a clean slate.
pub fn prepare(root: &Path) -> Result<JobPaths> {
    if root.parent().is_none() || root.file_name().is_none() {
        return Err(Error::Workspace(format!(
            "refusing to use '{}' as a job root",
            root.display()
        )));
    }
    if root.exists() {
        fs::remove_dir_all(root).map_err(|e| {
            Error::Workspace(format!(
                "failed to clear stale job root {}: {e}",
                root.display()
            ))
        })?;
    }
    let paths = job_paths(root);
    fs::create_dir_all(&paths.tree_dir).map_err(|e| {
        Error::Workspace(format!(
            "failed to create job root {}: {e}",
            root.display()
        ))
    })?;
    Ok(paths)
}

/// Remove a job root and everything beneath it. Missing path is a no-op.
pub fn discard(root: &Path) -> Result<()> {
    if !root.exists() {
        return Ok(());
    }
    fs::remove_dir_all(root).map_err(|e| {
        Error::Workspace(format!(
            "failed to remove job root {}: {e}",
            root.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_clears_residue_from_interrupted_job() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("job-1");

        // Simulate a prior run that died mid-extraction.
        let stale = root.join("decompiled/smali/com/example");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("Leftover.smali"), ".class public LLeftover;").unwrap();
        fs::write(root.join("unsigned.apk"), b"partial").unwrap();

        let paths = prepare(&root).expect("prepare");
        assert!(paths.tree_dir.exists());
        assert_eq!(fs::read_dir(&paths.tree_dir).unwrap().count(), 0);
        assert!(!paths.unsigned_apk.exists());
    }

    #[test]
    fn discard_is_noop_on_missing_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        discard(&tmp.path().join("never-created")).expect("discard");
    }

    #[test]
    fn discard_removes_everything() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("job-2");
        let paths = prepare(&root).expect("prepare");
        fs::write(&paths.unsigned_apk, b"apk").unwrap();
        discard(&root).expect("discard");
        assert!(!root.exists());
    }

    #[test]
    fn job_ids_key_distinct_roots() {
        fn parse(id: &str) -> (i64, u32) {
            let (stamp, pid) = id.split_once('-').expect("stamp-pid form");
            (stamp.parse().expect("millis"), pid.parse().expect("pid"))
        }

        let (stamp_a, pid_a) = parse(&new_job_id());
        let (stamp_b, pid_b) = parse(&new_job_id());

        // Same process, monotone-enough stamps: two ids from concurrent
        // processes differ by pid, two from later jobs differ by stamp.
        assert_eq!(pid_a, std::process::id());
        assert_eq!(pid_a, pid_b);
        assert!(stamp_b >= stamp_a);
        // A real wall-clock millisecond stamp, not some counter.
        assert!(stamp_a > 1_600_000_000_000);
    }
}
