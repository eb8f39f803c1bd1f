use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sign::SigningPolicy;

fn default_jobs_dir() -> String {
    "patch-jobs".into()
}

fn default_apktool() -> Vec<String> {
    vec!["apktool".into()]
}

fn default_apksigner() -> Vec<String> {
    vec!["apksigner".into()]
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_entry_candidates() -> Vec<String> {
    vec![
        "smali/com/chucklefish/stardewvalley/StardewValley.smali".into(),
        "smali_classes2/com/chucklefish/stardewvalley/StardewValley.smali".into(),
    ]
}

fn default_signature() -> String {
    "onCreate(Landroid/os/Bundle;)V".into()
}

fn default_bootstrap_class() -> String {
    "com/potatameister/smapi/SmapiNative".into()
}

fn default_true() -> bool {
    true
}

fn default_payload_dir() -> String {
    "payloads".into()
}

fn default_payload_names() -> Vec<String> {
    vec!["StardewModdingAPI.dll".into()]
}

fn default_keystore() -> String {
    "potata_patcher.p12".into()
}

fn default_key_alias() -> String {
    "potata_patcher".into()
}

fn default_keystore_pass() -> String {
    "potata-patcher-key-2026".into()
}

/// Behavior when the entry class exists but the lifecycle signature line
/// does not appear in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingSignature {
    /// Fail the job. An APK without the hook would install but never start
    /// the bundled runtime.
    Fail,
    /// Rewrite the file unchanged and continue.
    Keep,
}

impl Default for MissingSignature {
    fn default() -> Self {
        MissingSignature::Fail
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory under which each job gets its own keyed subtree.
    pub jobs_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Decompile/rebuild tool argv prefix.
    pub apktool: Vec<String>,
    /// Signing tool argv prefix.
    pub apksigner: Vec<String>,
    /// Per-invocation deadline for external tools. 0 disables the deadline.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            apktool: default_apktool(),
            apksigner: default_apksigner(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    /// Candidate paths of the entry class disassembly, relative to the
    /// decompiled tree, in resolution order. apktool splits large apps
    /// across numbered smali roots, hence more than one candidate.
    pub entry_candidates: Vec<String>,
    /// Substring identifying the lifecycle method declaration line.
    pub signature: String,
    /// JVM-internal name of the bootstrap class whose static `init()V` is
    /// invoked from the hook.
    pub bootstrap_class: String,
    /// Synthesize the bootstrap class smali into the tree. Disable when the
    /// target package already ships the class.
    pub synthesize_bootstrap: bool,
    /// Exported to the managed runtime by the synthesized bootstrap, when set.
    pub base_dir_export: Option<String>,
    pub missing_signature: MissingSignature,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            entry_candidates: default_entry_candidates(),
            signature: default_signature(),
            bootstrap_class: default_bootstrap_class(),
            synthesize_bootstrap: default_true(),
            base_dir_export: None,
            missing_signature: MissingSignature::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Directory holding the runtime payload files shipped with this tool.
    pub dir: String,
    /// Payload file names copied into the package's assembly asset dir.
    pub names: Vec<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            dir: default_payload_dir(),
            names: default_payload_names(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub policy: SigningPolicy,
    pub keystore: String,
    pub key_alias: String,
    pub keystore_pass: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            policy: SigningPolicy::default(),
            keystore: default_keystore(),
            key_alias: default_key_alias(),
            keystore_pass: default_keystore_pass(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BrandConfig {
    pub enabled: bool,
    /// Replacement launcher icon (png). Applied to known icon resource names.
    pub icon: Option<String>,
    /// Package id rewrite inside the binary manifest. Both ids must have the
    /// same byte length.
    pub rename_from: Option<String>,
    pub rename_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatcherConfig {
    pub workspace: WorkspaceConfig,
    pub tools: ToolsConfig,
    pub inject: InjectConfig,
    pub payloads: PayloadConfig,
    pub signing: SigningConfig,
    pub brand: BrandConfig,
}

pub fn load(path: &Path) -> Result<PatcherConfig> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config {}: {e}", path.display())))?;
    let cfg: PatcherConfig = toml::from_str(&data)?;
    Ok(cfg)
}
