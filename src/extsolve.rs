//! Shared external-subprocess plumbing.
//!
//! `decompose::run`, `nested::external::{call_sat, call_preprocessor,
//! call_classical}` and `abstraction::chooser` all spawn a child process,
//! feed it a blob on stdin, enforce a wall-clock timeout via a watcher
//! thread, and retry on a configurable set of return codes. That behavior
//! lives here once.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// How an external solver's stdout is turned back into structured data.
/// Only PMC/#SAT solvers with nonstandard output need this; SAT solvers
/// use the plain DIMACS `s`/`v` convention handled in `nested::external`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputParserSpec {
    /// Regex with one capture group yielding the model count / result.
    pub pattern: String,
}

/// Outcome of one subprocess invocation.
#[derive(Debug)]
pub struct RunOutcome {
    pub status_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Spawn `path args` with `stdin` as input, wait at most `timeout` (if
/// `Some`), and kill the child if it overruns. A watcher thread owns the
/// kill so the waiting thread here is a plain blocking `wait()`.
pub fn run_once(
    path: &PathBuf,
    args: &[String],
    stdin: &[u8],
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let mut cmd = Command::new(path);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(Error::Io)?;

    if let Some(mut pipe) = child.stdin.take() {
        // the child may exit early (e.g. on malformed input) and close its
        // end; a broken pipe here is not itself a failure, the exit code is.
        let _ = pipe.write_all(stdin);
    }

    let killed = Arc::new(Mutex::new(false));
    let watcher = spawn_watcher(&mut child, timeout, cancel, Arc::clone(&killed));

    let output = child.wait_with_output().map_err(Error::Io)?;
    if let Some(handle) = watcher {
        let _ = handle.join();
    }

    let timed_out = *killed.lock();
    Ok(RunOutcome {
        status_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
        timed_out,
    })
}

fn spawn_watcher(
    child: &mut Child,
    timeout: Option<Duration>,
    cancel: &CancelToken,
    killed: Arc<Mutex<bool>>,
) -> Option<std::thread::JoinHandle<()>> {
    if timeout.is_none() && !cancel.is_live() {
        return None;
    }
    let id = child.id();
    let cancel = cancel.clone();
    Some(std::thread::spawn(move || {
        let start = Instant::now();
        loop {
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    kill_pid(id);
                    *killed.lock() = true;
                    return;
                }
            }
            if cancel.is_cancelled() {
                kill_pid(id);
                *killed.lock() = true;
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }))
}

/// Kill a process by id without reaching for raw libc bindings: the
/// crate's one `unsafe` block is reserved for signal handling in
/// `cancel.rs`, so this shells out to the platform's own kill tool.
fn kill_pid(pid: u32) {
    #[cfg(unix)]
    let result = Command::new("kill").arg("-9").arg(pid.to_string()).status();
    #[cfg(not(unix))]
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status();
    if let Err(e) = result {
        warn!(pid, error = %e, "failed to kill timed-out subprocess");
    }
}

/// Run `path args` with retry on the configured exit codes (spec §4.I: a
/// solver returning 245/250 under resource contention is retried, not
/// treated as failure).
pub fn run_with_retry(
    path: &PathBuf,
    args: &[String],
    stdin: &[u8],
    timeout: Option<Duration>,
    retry_codes: &[i32],
    max_retries: u32,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let mut attempts = 0u32;
    loop {
        cancel.check()?;
        let outcome = run_once(path, args, stdin, timeout, cancel)?;
        attempts += 1;
        let should_retry = outcome
            .status_code
            .is_some_and(|c| retry_codes.contains(&c));
        if !should_retry || attempts > max_retries {
            if should_retry {
                warn!(attempts, path = %path.display(), "external solver exhausted retries");
                return Err(Error::SolverFailed {
                    attempts,
                    message: format!(
                        "exit code {:?} still in retry set after {attempts} attempts",
                        outcome.status_code
                    ),
                });
            }
            debug!(attempts, path = %path.display(), code = ?outcome.status_code, "external process finished");
            return Ok(outcome);
        }
        debug!(attempts, path = %path.display(), code = ?outcome.status_code, "retrying external process");
        // jittered backoff: a solver retried under resource contention
        // shouldn't immediately hammer the same contended resource again.
        let jitter_ms: u64 = rand::thread_rng().gen_range(50..=250);
        std::thread::sleep(Duration::from_millis(jitter_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_once_captures_stdout() {
        let outcome = run_once(
            &PathBuf::from("/bin/echo"),
            &["hello".to_string()],
            b"",
            Some(Duration::from_secs(5)),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.status_code, Some(0));
        assert_eq!(String::from_utf8_lossy(&outcome.stdout).trim(), "hello");
        assert!(!outcome.timed_out);
    }

    #[test]
    fn run_with_retry_gives_up_after_max() {
        // `false` always exits 1; treat 1 as a retry code with a small cap
        // so the test finishes quickly.
        let err = run_with_retry(
            &PathBuf::from("/bin/false"),
            &[],
            b"",
            Some(Duration::from_secs(5)),
            &[1],
            2,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SolverFailed { attempts: 3, .. }));
    }
}
