//! Compression codecs.
//!
//! [`ZstdCli`] drives the external `zstd` program with an argument vector
//! (never a shell) under a wall-clock timeout. The child is killed if the
//! timeout elapses.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::ValidatedConfig;

/// Highest level `zstd` accepts without `--ultra`.
const ULTRA_THRESHOLD: u8 = 19;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout_secs}s and was killed")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("cannot start subprocess runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Compresses and decompresses whole files.
///
/// Implementations write exactly `output`; staging and verification are
/// the caller's job.
pub trait Codec: Send + Sync {
    fn compress(&self, input: &Path, output: &Path, level: u8) -> Result<(), CodecError>;

    fn decompress(&self, input: &Path, output: &Path) -> Result<(), CodecError>;
}

/// The `zstd` command-line tool.
#[derive(Debug, Clone)]
pub struct ZstdCli {
    program: String,
    timeout: Duration,
}

impl ZstdCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(config.codec_program(), config.codec_timeout())
    }

    pub fn compress_args(input: &Path, output: &Path, level: u8) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-q".into(), "-f".into()];
        if level > ULTRA_THRESHOLD {
            args.push("--ultra".into());
        }
        args.push(format!("-{level}").into());
        args.push("-o".into());
        args.push(output.into());
        args.push("--".into());
        args.push(input.into());
        args
    }

    pub fn decompress_args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-d".into(),
            "-q".into(),
            "-f".into(),
            "-o".into(),
            output.into(),
            "--".into(),
            input.into(),
        ]
    }

    fn run(&self, args: Vec<OsString>) -> Result<(), CodecError> {
        run_with_timeout(&self.program, args, self.timeout)
    }
}

impl Codec for ZstdCli {
    fn compress(&self, input: &Path, output: &Path, level: u8) -> Result<(), CodecError> {
        self.run(Self::compress_args(input, output, level))
    }

    fn decompress(&self, input: &Path, output: &Path) -> Result<(), CodecError> {
        self.run(Self::decompress_args(input, output))
    }
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
fn run_with_timeout(
    program: &str,
    args: Vec<OsString>,
    timeout: Duration,
) -> Result<(), CodecError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CodecError::Runtime)?;

    debug!(program, ?args, "running codec");
    runtime.block_on(async {
        let child = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CodecError::Launch {
                program: program.to_string(),
                source,
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => Err(CodecError::Timeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
            Ok(Err(source)) => Err(CodecError::Launch {
                program: program.to_string(),
                source,
            }),
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(CodecError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    })
}
