//! Bundler discovery and invocation.
//!
//! The bundler is an external program. [`probe_bundler`] is the only way to
//! get a checked [`CommandBundler`]: it runs `<program> --version`, compares
//! the reported version against the configured minimum and fails with a
//! typed [`ProbeError`] instead of letting the first build blow up.

use crate::hash::file_sha256;
use crate::target::BuildTarget;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::process::Output;
use std::time::Instant;
use swlive_core::{BuildError, BuildMode, BuildResult};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap());

/// Something that turns the worker sources into one build result.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Runs one build to completion.
    ///
    /// Failures are reported inside the result, never as a panic or an `Err`.
    async fn build(&self) -> BuildResult;
}

/// How to invoke the bundler.
///
/// `command` is an argv template; `{entry}`, `{output}` and `{mode}` are
/// substituted in every argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundlerConfig {
    pub command: Vec<String>,
    /// Oldest acceptable bundler version, as `major.minor.patch`.
    pub min_version: Option<String>,
    /// Extra argument appended for production builds.
    pub minify_arg: Option<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "esbuild".into(),
                "{entry}".into(),
                "--bundle".into(),
                "--format=iife".into(),
                "--outfile={output}".into(),
            ],
            min_version: None,
            minify_arg: Some("--minify".into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("no bundler command configured")]
    EmptyCommand,

    #[error("bundler `{program}` is not available: {reason}")]
    Unavailable { program: String, reason: String },

    #[error("swlive depends on at least {program}@{required} but only {program}@{found} was found")]
    IncompatibleVersion {
        program: String,
        required: String,
        found: String,
    },

    #[error("invalid minimum bundler version `{0}`: {1}")]
    InvalidRequirement(String, semver::Error),
}

/// Checks that the configured bundler can be run and is recent enough.
pub async fn probe_bundler(
    config: &BundlerConfig,
    target: BuildTarget,
) -> Result<CommandBundler, ProbeError> {
    let program = config.command.first().ok_or(ProbeError::EmptyCommand)?;

    let output = Command::new(program)
        .arg("--version")
        .current_dir(&target.root)
        .output()
        .await
        .map_err(|e| ProbeError::Unavailable {
            program: program.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProbeError::Unavailable {
            program: program.clone(),
            reason: format!("`{} --version` exited with {}", program, output.status),
        });
    }

    let reported = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let version = extract_version(&reported);

    if let Some(required) = &config.min_version {
        let minimum = Version::parse(required)
            .map_err(|e| ProbeError::InvalidRequirement(required.clone(), e))?;

        let compatible = version.as_ref().is_some_and(|v| *v >= minimum);
        if !compatible {
            return Err(ProbeError::IncompatibleVersion {
                program: program.clone(),
                required: minimum.to_string(),
                found: version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "0.0.0".to_string()),
            });
        }
    }

    info!(
        program = %program,
        version = %version.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
        "bundler available"
    );

    Ok(CommandBundler {
        config: config.clone(),
        target,
        version,
    })
}

/// Pulls the first `major.minor.patch` triple out of `--version` output.
fn extract_version(text: &str) -> Option<Version> {
    let caps = VERSION_PATTERN.captures(text)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());

    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Runs an external bundler command and hashes what it wrote.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    config: BundlerConfig,
    target: BuildTarget,
    version: Option<Version>,
}

impl CommandBundler {
    /// Creates a bundler without probing it first.
    pub fn new(config: BundlerConfig, target: BuildTarget) -> Self {
        Self {
            config,
            target,
            version: None,
        }
    }

    /// Version reported during probing, if any.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// The argv for one run, placeholders substituted.
    pub fn argv(&self) -> Vec<String> {
        let entry = self.target.entry.display().to_string();
        let output = self.target.output_path().display().to_string();
        let mode = self.target.mode.to_string();

        let mut argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|arg| {
                arg.replace("{entry}", &entry)
                    .replace("{output}", &output)
                    .replace("{mode}", &mode)
            })
            .collect();

        if self.target.mode == BuildMode::Production {
            if let Some(minify) = &self.config.minify_arg {
                argv.push(minify.clone());
            }
        }

        argv
    }

    /// Environment exported to the bundler process.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SWLIVE_SW_URL", self.target.worker_url()),
            ("SWLIVE_SW_SCOPE", self.target.scope.clone()),
            ("SWLIVE_MODE", self.target.mode.to_string()),
        ]
    }

    fn failed(&self, hash: String, message: String) -> BuildResult {
        BuildResult::failure(
            hash,
            vec![BuildError::in_module(self.target.entry_display(), message)],
        )
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn build(&self) -> BuildResult {
        let argv = self.argv();
        let Some((program, args)) = argv.split_first() else {
            return self.failed(String::new(), ProbeError::EmptyCommand.to_string());
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.target.output_dir).await {
            return self.failed(
                String::new(),
                format!("cannot create {}: {}", self.target.output_dir.display(), e),
            );
        }

        let start = Instant::now();
        debug!(command = ?argv, "running bundler");

        let output = match Command::new(program)
            .args(args)
            .envs(self.env())
            .current_dir(&self.target.root)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => return self.failed(String::new(), format!("failed to run {}: {}", program, e)),
        };

        let output_path = self.target.output_path();
        let hash = file_sha256(&output_path).await;

        debug!(
            status = %output.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "bundler finished"
        );

        if output.status.success() {
            match hash {
                Ok(hash) => BuildResult::success(hash),
                Err(e) => self.failed(
                    String::new(),
                    format!("{} was not produced: {}", output_path.display(), e),
                ),
            }
        } else {
            self.failed(hash.unwrap_or_default(), failure_message(program, &output))
        }
    }
}

/// Error text for a failed run: stderr, else stdout, else the exit status.
fn failure_message(program: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }

    format!("{} exited with {}", program, output.status)
}
