//! Blocking process invocation with merged output and timeout enforcement.
//!
//! stderr is merged into stdout through a shared pipe so the caller sees
//! output exactly as emitted, interleaving preserved. Timeout expiry
//! terminates the in-flight process with SIGTERM, a short grace period,
//! then SIGKILL, and surfaces a timeout failure; a command can never hang
//! collection indefinitely. Output is capped to bound memory.

use std::collections::BTreeMap;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use scout_common::{Error, Result};

use super::RunOutput;

/// Default output cap in bytes (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
#[cfg(unix)]
const SIGTERM_GRACE_MS: u64 = 500;

/// Runner limits, serde-typed so a collection driver can carry them in its
/// configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timeout applied when neither the call nor the execution context
    /// supplies one; `None` lets commands run to completion.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// Maximum bytes of merged output retained per command.
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
}

fn default_max_output() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            default_timeout_ms: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl RunnerConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

/// Per-call invocation parameters.
#[derive(Debug, Clone, Default)]
pub struct CallSpec {
    /// Effective timeout; `None` falls back to the runner default.
    pub timeout: Option<Duration>,

    /// Capture a non-zero exit status instead of failing.
    pub keep_rc: bool,

    /// Replacement environment; `None` inherits the process environment.
    pub env: Option<BTreeMap<String, String>>,
}

/// Run `cmd` with default runner limits.
pub fn call(cmd: &str, spec: &CallSpec) -> Result<RunOutput> {
    call_with(cmd, spec, &RunnerConfig::default())
}

/// Run `cmd` under explicit runner limits.
pub fn call_with(cmd: &str, spec: &CallSpec, config: &RunnerConfig) -> Result<RunOutput> {
    let argv = split_words(cmd)?;
    let timeout = spec.timeout.or_else(|| config.default_timeout());

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]).stdin(Stdio::null());
    if let Some(env) = &spec.env {
        command.env_clear();
        command.envs(env);
    }

    debug!(
        command = %cmd,
        timeout_ms = timeout.map(|t| t.as_millis() as u64),
        keep_rc = spec.keep_rc,
        "running command"
    );

    let (bytes, code) = execute(&mut command, cmd, timeout, config.max_output_bytes)?;
    let output = String::from_utf8_lossy(&bytes).into_owned();
    // Signal death has no exit code; report it as -1.
    let code = code.unwrap_or(-1);

    trace!(command = %cmd, code, bytes = output.len(), "command complete");

    if spec.keep_rc {
        Ok(RunOutput {
            exit_code: Some(code),
            output,
        })
    } else if code != 0 {
        warn!(command = %cmd, code, "command exited non-zero");
        Err(Error::CommandFailed {
            command: cmd.to_string(),
            code,
            output,
        })
    } else {
        Ok(RunOutput {
            exit_code: None,
            output,
        })
    }
}

/// Split a command string into argv words, honoring quotes and backslash
/// escapes. No globbing, substitution, or redirection; a command that
/// needs shell features must invoke the shell explicitly.
pub fn split_words(cmd: &str) -> Result<Vec<String>> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(Error::BadCommand(format!(
                            "trailing backslash: {cmd}"
                        )))
                    }
                },
                c => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some(next) => {
                        current.push(next);
                        in_word = true;
                    }
                    None => {
                        return Err(Error::BadCommand(format!(
                            "trailing backslash: {cmd}"
                        )))
                    }
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(Error::BadCommand(format!("unbalanced quote: {cmd}")));
    }
    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(Error::BadCommand("empty command".to_string()));
    }
    Ok(words)
}

/// Append up to the cap, silently discarding the excess. The pipe must
/// still be drained past the cap or the child would block on a full pipe.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max: usize, discarded: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space >= chunk.len() {
        buf.extend_from_slice(chunk);
    } else {
        buf.extend_from_slice(&chunk[..space]);
        *discarded = true;
    }
}

/// Spawn with stdout and stderr dup'd onto one pipe, then read it under a
/// deadline.
#[cfg(unix)]
fn execute(
    command: &mut Command,
    cmd: &str,
    timeout: Option<Duration>,
    max_output: usize,
) -> Result<(Vec<u8>, Option<i32>)> {
    use std::os::unix::io::FromRawFd;

    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    let mut reader = unsafe { std::fs::File::from_raw_fd(read_fd) };

    let dup_fd = unsafe { libc::dup(write_fd) };
    if dup_fd < 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(write_fd) };
        return Err(Error::Io(err));
    }
    command.stdout(unsafe { Stdio::from_raw_fd(write_fd) });
    command.stderr(unsafe { Stdio::from_raw_fd(dup_fd) });

    let mut child = command.spawn().map_err(|e| Error::Spawn {
        command: cmd.to_string(),
        reason: e.to_string(),
    })?;

    let start = Instant::now();
    let mut buf = Vec::with_capacity(max_output.min(65536));
    let mut chunk = vec![0u8; 8192];
    let mut discarded = false;

    loop {
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                warn!(command = %cmd, timeout_ms = limit.as_millis() as u64, "command timed out, terminating");
                kill_with_grace(&mut child);
                return Err(Error::Timeout {
                    command: cmd.to_string(),
                    timeout: limit,
                });
            }
        }

        let n = try_read_nonblocking(&mut reader, &mut chunk)?;
        if n > 0 {
            append_capped(&mut buf, &chunk[..n], max_output, &mut discarded);
            continue;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Drain what is immediately available; reads stay
                // non-blocking so a grandchild still holding the pipe open
                // cannot hang us.
                loop {
                    let n = try_read_nonblocking(&mut reader, &mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    append_capped(&mut buf, &chunk[..n], max_output, &mut discarded);
                }
                if discarded {
                    warn!(command = %cmd, cap = max_output, "output exceeded cap, truncated");
                }
                return Ok((buf, status.code()));
            }
            Ok(None) => thread::sleep(Duration::from_millis(10)),
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Fallback without fd plumbing: capture the two streams separately and
/// concatenate. The timeout is best-effort here; the primary targets are
/// unix hosts.
#[cfg(not(unix))]
fn execute(
    command: &mut Command,
    cmd: &str,
    timeout: Option<Duration>,
    max_output: usize,
) -> Result<(Vec<u8>, Option<i32>)> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let start = Instant::now();
    let child = command.spawn().map_err(|e| Error::Spawn {
        command: cmd.to_string(),
        reason: e.to_string(),
    })?;

    let out = child.wait_with_output().map_err(Error::Io)?;
    if let Some(limit) = timeout {
        if start.elapsed() >= limit {
            return Err(Error::Timeout {
                command: cmd.to_string(),
                timeout: limit,
            });
        }
    }

    let mut buf = Vec::new();
    let mut discarded = false;
    append_capped(&mut buf, &out.stdout, max_output, &mut discarded);
    append_capped(&mut buf, &out.stderr, max_output, &mut discarded);
    Ok((buf, out.status.code()))
}

/// Read without blocking: O_NONBLOCK is set for the read and restored
/// afterwards; EAGAIN/EWOULDBLOCK come back as `Ok(0)`.
#[cfg(unix)]
fn try_read_nonblocking(
    stream: &mut std::fs::File,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    use std::io::Read;
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

/// Terminate with SIGTERM, escalate to SIGKILL after the grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => {
            trace!(pid, "process exited after SIGTERM");
        }
        Ok(None) => {
            warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
            let _ = child.wait();
        }
        Err(e) => {
            warn!(pid, error = %e, "failed to check process status");
            let _ = child.wait();
        }
    }
}
