use std::fmt;

/// Pipeline error. Every variant belongs to exactly one stage so the
/// orchestrator can report which stage failed.
#[derive(Debug)]
pub enum Error {
    Config(String),
    Workspace(String),
    Extraction(String),
    InjectionTargetNotFound(String),
    Injection(String),
    Bundle(String),
    Rebuild(String),
    Brand(String),
    Signing(String),
    Timeout { stage: &'static str, secs: u64 },
}

impl Error {
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Workspace(_) => "workspace",
            Error::Extraction(_) => "extract",
            Error::InjectionTargetNotFound(_) | Error::Injection(_) => "inject",
            Error::Bundle(_) => "bundle",
            Error::Rebuild(_) => "rebuild",
            Error::Brand(_) => "brand",
            Error::Signing(_) => "sign",
            Error::Timeout { stage, .. } => stage,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Workspace(msg) => write!(f, "workspace error: {msg}"),
            Error::Extraction(msg) => write!(f, "extraction failed: {msg}"),
            Error::InjectionTargetNotFound(msg) => {
                write!(f, "injection target not found: {msg}")
            }
            Error::Injection(msg) => write!(f, "injection failed: {msg}"),
            Error::Bundle(msg) => write!(f, "payload bundling failed: {msg}"),
            Error::Rebuild(msg) => write!(f, "rebuild failed: {msg}"),
            Error::Brand(msg) => write!(f, "branding failed: {msg}"),
            Error::Signing(msg) => write!(f, "signing failed: {msg}"),
            Error::Timeout { stage, secs } => {
                write!(f, "stage '{stage}' timed out after {secs}s")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
