use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::utils::{Error, Result};

/// Minimum size an external tool's output file must reach to be considered real output.
pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 2 * 1024;

/// Outcome of a single external process invocation. The runner never interprets a
/// non-zero exit as an error itself; callers decide what to do with `ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub ok: bool,
}

impl RunOutcome {
    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            ok: false,
        }
    }
}

/// Spawns external tools and streams their stdout/stderr to the `stream_log` tracing
/// target while the process runs, rather than buffering until exit.
pub struct ProcessRunner;

impl ProcessRunner {
    pub async fn run(program: &str, args: &[String], timeout: Option<Duration>) -> Result<RunOutcome> {
        debug!("Running: {} {}", program, args.join(" "));

        let mut child: Child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::tool(format!("failed to spawn {program}: {e}")))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_task = tokio::spawn(drain_stream(stdout, "STDOUT"));
        let stderr_task = tokio::spawn(drain_stream(stderr, "STDERR"));

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result.map_err(|e| Error::tool(format!("{program} failed: {e}")))?,
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    return Ok(RunOutcome::timed_out());
                }
            },
            None => child
                .wait()
                .await
                .map_err(|e| Error::tool(format!("{program} failed: {e}")))?,
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        Ok(RunOutcome {
            exit_code: status.code(),
            ok: status.success(),
        })
    }

    /// Checks that the tool produced a plausible output file, per the size-check
    /// contract every stage relies on to decide whether a run actually succeeded.
    pub async fn validate_output(path: impl AsRef<Path>, min_bytes: u64) -> Result<()> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| Error::tool(format!("output file missing: {}", path.display())))?;

        if meta.len() < min_bytes {
            return Err(Error::tool(format!(
                "output file too small ({} bytes, expected >= {}): {}",
                meta.len(),
                min_bytes,
                path.display()
            )));
        }

        Ok(())
    }
}

/// Reads a child stream, decoding UTF-8 leniently and splitting on CR/LF, suppressing
/// empty lines and immediate duplicates before forwarding to the stream log.
async fn drain_stream<R>(mut reader: R, tag: &'static str)
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut last_line: Option<String> = None;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n' || b == b'\r') {
            let raw: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            emit_line(&line, tag, &mut last_line);
        }
    }

    if !buf.is_empty() {
        let line = String::from_utf8_lossy(&buf).into_owned();
        emit_line(&line, tag, &mut last_line);
    }
}

fn emit_line(line: &str, tag: &'static str, last_line: &mut Option<String>) {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return;
    }
    if last_line.as_deref() == Some(line) {
        return;
    }
    tracing::debug!(target: "stream_log", "[{}] {}", tag, line);
    *last_line = Some(line.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_exit_status() {
        let outcome = ProcessRunner::run("true", &[], None).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn run_reports_non_zero_exit_without_erroring() {
        let outcome = ProcessRunner::run("false", &[], None).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn run_times_out() {
        let outcome = ProcessRunner::run(
            "sleep",
            &["5".to_string()],
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn validate_output_rejects_undersized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        tokio::fs::write(&path, vec![0u8; 16]).await.unwrap();
        let result = ProcessRunner::validate_output(&path, DEFAULT_MIN_OUTPUT_BYTES).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn validate_output_accepts_large_enough_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        tokio::fs::write(&path, vec![0u8; DEFAULT_MIN_OUTPUT_BYTES as usize]).await.unwrap();
        let result = ProcessRunner::validate_output(&path, DEFAULT_MIN_OUTPUT_BYTES).await;
        assert!(result.is_ok());
    }
}
