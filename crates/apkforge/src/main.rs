use clap::{Parser, Subcommand};
use std::path::PathBuf;

use apkforge::config::{self, PatcherConfig};
use apkforge::pipeline::Pipeline;
use apkforge::Result;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Patch a package: decompile, hook the entry point, bundle the runtime
    /// payloads, rebuild, and sign
    Patch {
        /// Path to the source APK
        apk: PathBuf,
        /// Path to a patcher config TOML (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Reuse a fixed job id instead of generating one
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Remove a job workspace (the whole jobs dir when no id is given)
    Clean {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Print the effective configuration as TOML
    Resolve {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Patch {
            apk,
            config,
            job_id,
        } => cmd_patch(&apk, &config, job_id),
        Command::Clean { config, job_id } => cmd_clean(&config, job_id),
        Command::Resolve { config } => cmd_resolve(&config),
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<PatcherConfig> {
    match path {
        Some(p) => config::load(p),
        None => Ok(PatcherConfig::default()),
    }
}

fn cmd_patch(apk: &PathBuf, config: &Option<PathBuf>, job_id: Option<String>) -> Result<()> {
    let pipeline = Pipeline::new(load_config(config)?);
    let outcome = match job_id {
        Some(id) => pipeline.patch_package_with_id(apk, &id)?,
        None => pipeline.patch_package(apk)?,
    };
    println!("{}", outcome.artifact.display());
    Ok(())
}

fn cmd_clean(config: &Option<PathBuf>, job_id: Option<String>) -> Result<()> {
    let pipeline = Pipeline::new(load_config(config)?);
    match job_id {
        Some(id) => pipeline.discard_job(&id),
        None => pipeline.discard_all(),
    }
}

fn cmd_resolve(config: &Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config)?;
    let s = toml::to_string_pretty(&cfg).unwrap_or_else(|_| format!("{:?}", cfg));
    print!("{s}");
    Ok(())
}
