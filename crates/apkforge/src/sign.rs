use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SigningConfig;
use crate::error::{Error, Result};
use crate::tool::{ExternalTool, ToolError};

/// What to do when the signing tool fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningPolicy {
    /// Signer failure fails the job.
    Strict,
    /// Signer failure is logged and the unsigned artifact is renamed into
    /// place. The result will not install where signature verification is
    /// enforced; callers opt into this knowingly.
    LenientPlaceholder,
}

impl Default for SigningPolicy {
    fn default() -> Self {
        SigningPolicy::Strict
    }
}

/// Sign the rebuilt package with the fixed keystore credentials and return
/// the final artifact path.
pub fn sign(
    tool: &ExternalTool,
    cfg: &SigningConfig,
    unsigned_apk: &Path,
    signed_apk: &Path,
) -> Result<PathBuf> {
    tracing::info!(out = %signed_apk.display(), "signing package");
    let pass = format!("pass:{}", cfg.keystore_pass);
    let run = tool.run(&[
        "sign".as_ref(),
        "--ks".as_ref(),
        cfg.keystore.as_ref(),
        "--ks-key-alias".as_ref(),
        cfg.key_alias.as_ref(),
        "--ks-pass".as_ref(),
        pass.as_ref(),
        "--out".as_ref(),
        signed_apk.as_os_str(),
        unsigned_apk.as_os_str(),
    ]);

    match run {
        Ok(()) => Ok(signed_apk.to_path_buf()),
        Err(ToolError::Timeout(secs)) => Err(Error::Timeout { stage: "sign", secs }),
        Err(e) => match cfg.policy {
            SigningPolicy::Strict => Err(Error::Signing(format!("{}: {e}", tool.program()))),
            SigningPolicy::LenientPlaceholder => {
                tracing::warn!(
                    error = %e,
                    "signer failed; renaming unsigned artifact into place (NOT installable \
                     where signature verification is enforced)"
                );
                fs::rename(unsigned_apk, signed_apk).map_err(|e| {
                    Error::Signing(format!(
                        "failed to substitute unsigned artifact at {}: {e}",
                        signed_apk.display()
                    ))
                })?;
                Ok(signed_apk.to_path_buf())
            }
        },
    }
}
