use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::config::PatcherConfig;
use crate::error::{Error, Result};
use crate::tool::ExternalTool;
use crate::{apktool, brand, bundle, inject, sign, workspace};

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: &'static str,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub job_id: String,
    /// Final artifact: signed, or unsigned-renamed under the lenient policy.
    pub artifact: PathBuf,
    pub stages: Vec<StageRecord>,
}

/// Sequences the stages for one job: workspace, extract, brand, inject,
/// bundle, rebuild, sign. Linear, no retries; the first failing stage fails
/// the job and its workspace stays on disk for inspection.
pub struct Pipeline {
    cfg: PatcherConfig,
}

impl Pipeline {
    pub fn new(cfg: PatcherConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PatcherConfig {
        &self.cfg
    }

    pub fn job_root(&self, job_id: &str) -> PathBuf {
        Path::new(&self.cfg.workspace.jobs_dir).join(job_id)
    }

    pub fn discard_job(&self, job_id: &str) -> Result<()> {
        workspace::discard(&self.job_root(job_id))
    }

    pub fn discard_all(&self) -> Result<()> {
        workspace::discard(Path::new(&self.cfg.workspace.jobs_dir))
    }

    /// Single outward entry point. The job gets a fresh id so concurrent
    /// jobs never share a workspace root.
    pub fn patch_package(&self, source: &Path) -> Result<PatchOutcome> {
        self.patch_package_with_id(source, &workspace::new_job_id())
    }

    pub fn patch_package_with_id(&self, source: &Path, job_id: &str) -> Result<PatchOutcome> {
        let result = self.run_job(source, job_id);
        if let Err(e) = &result {
            tracing::error!(
                job_id,
                stage = e.stage(),
                error = %e,
                workspace = %self.job_root(job_id).display(),
                "patch job failed; workspace left for inspection"
            );
        }
        result
    }

    fn run_job(&self, source: &Path, job_id: &str) -> Result<PatchOutcome> {
        tracing::info!(job_id, source = %source.display(), "patch job starting");

        let apktool_tool = ExternalTool::new(&self.cfg.tools.apktool, self.cfg.tools.timeout_secs)
            .map_err(Error::Config)?;
        let signer_tool = ExternalTool::new(&self.cfg.tools.apksigner, self.cfg.tools.timeout_secs)
            .map_err(Error::Config)?;

        let root = self.job_root(job_id);
        let mut stages = Vec::new();

        let paths = run_stage(&mut stages, "workspace", || workspace::prepare(&root))?;

        run_stage(&mut stages, "extract", || {
            fs::copy(source, &paths.source_apk).map_err(|e| {
                Error::Extraction(format!(
                    "failed to copy source package {}: {e}",
                    source.display()
                ))
            })?;
            apktool::extract(&apktool_tool, &paths.source_apk, &paths.tree_dir)
        })?;

        if self.cfg.brand.enabled {
            run_stage(&mut stages, "brand", || {
                brand::apply(&paths.tree_dir, &self.cfg.brand)
            })?;
        }

        run_stage(&mut stages, "inject", || {
            inject::inject_entry_hook(&paths.tree_dir, &self.cfg.inject)?;
            if self.cfg.inject.synthesize_bootstrap {
                inject::inject_bootstrap_class(&paths.tree_dir, &self.cfg.inject)?;
            }
            Ok(())
        })?;

        run_stage(&mut stages, "bundle", || {
            bundle::bundle(
                &paths.tree_dir,
                Path::new(&self.cfg.payloads.dir),
                &self.cfg.payloads.names,
            )
            .map(|_| ())
        })?;

        run_stage(&mut stages, "rebuild", || {
            apktool::build(&apktool_tool, &paths.tree_dir, &paths.unsigned_apk)
        })?;

        let artifact = run_stage(&mut stages, "sign", || {
            sign::sign(
                &signer_tool,
                &self.cfg.signing,
                &paths.unsigned_apk,
                &paths.signed_apk,
            )
        })?;

        let outcome = PatchOutcome {
            job_id: job_id.to_string(),
            artifact,
            stages,
        };
        write_report(&root, &outcome);
        tracing::info!(job_id, artifact = %outcome.artifact.display(), "patch job finished");
        Ok(outcome)
    }
}

fn run_stage<T>(
    records: &mut Vec<StageRecord>,
    stage: &'static str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    tracing::info!(stage, "stage starting");
    let started = Instant::now();
    let out = f()?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(stage, elapsed_ms, "stage finished");
    records.push(StageRecord { stage, elapsed_ms });
    Ok(out)
}

// The artifact is already produced at this point; a report problem is worth
// a warning, not a failed job.
fn write_report(root: &Path, outcome: &PatchOutcome) {
    let report = serde_json::json!({
        "job_id": outcome.job_id,
        "artifact": outcome.artifact.display().to_string(),
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "stages": &outcome.stages,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(s) => {
            if let Err(e) = fs::write(root.join("report.json"), s) {
                tracing::warn!(error = %e, "failed to write job report");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode job report"),
    }
}
