//! Launching external processes and capturing what they produce.

use crate::error::StepError;
#[cfg(unix)]
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::{
    collections::BTreeMap,
    fmt::Display,
    io::{Read, Write},
    path::PathBuf,
    process::{Child, ExitStatus, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// How a child process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child exited normally with the given code.
    Exited(i32),
    /// The child was terminated by the given signal.
    Signaled(i32),
    /// The platform reported no exit code and no signal.
    Unknown,
}

impl ExitOutcome {
    /// Classifies a raw exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }

        #[cfg(unix)]
        if let Some(signal) = status.signal() {
            return Self::Signaled(signal);
        }

        Self::Unknown
    }

    /// Returns the exit code, if the child exited normally.
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled(_) | Self::Unknown => None,
        }
    }
}

impl Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "was terminated by signal {signal}"),
            Self::Unknown => write!(f, "terminated abnormally"),
        }
    }
}

/// A fully resolved process invocation.
#[derive(Clone, Debug, Default)]
pub struct ProcessRequest {
    /// Program to execute; looked up in `PATH` when not a path.
    pub program: String,
    /// Arguments to pass.
    pub args: Vec<String>,
    /// Environment variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Working directory for the child.
    pub current_dir: Option<PathBuf>,
    /// Bytes to feed to the child's stdin; stdin is closed immediately when absent.
    pub stdin: Option<Vec<u8>>,
    /// Time after which the child is killed.
    pub timeout: Option<Duration>,
}

/// Result of running a process to completion.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// How the process terminated.
    pub outcome: ExitOutcome,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

/// Runs processes on behalf of test steps.
///
/// Runs block the calling thread until the child exits. Implementations never retry;
/// a failure to launch is reported straight back to the caller.
pub trait ProcessRunner: Send + Sync {
    /// Runs the requested process to completion.
    fn run(&self, request: &ProcessRequest) -> Result<RunResult, StepError>;
}

/// [`ProcessRunner`] that spawns real OS processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcessRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, request: &ProcessRequest) -> Result<RunResult, StepError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args).envs(&request.env);

        // Sorting and comparison steps must collate byte-wise on every host.
        cmd.env("LC_ALL", "C");

        if let Some(dir) = &request.current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        // SAFETY:
        // Children get a session of their own so that nothing they do can reach the
        // controlling terminal of the harness, and so that a timed-out child can be
        // killed together with everything it forked. setsid() does not allocate and
        // is safe to call between fork() and exec().
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                let _ = nix::unistd::setsid();
                Ok(())
            })
        };

        tracing::debug!(program = %request.program, args = ?request.args, "spawning");

        let spawn_error = |source| StepError::ProcessSpawn {
            program: request.program.clone(),
            source,
        };

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(spawn_error)?;

        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), request.stdin.clone()) {
            // A child that exits without reading its input closes the pipe; that is not
            // an error of the harness.
            std::thread::spawn(move || {
                let _ = pipe.write_all(&input);
            });
        }

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = request.timeout.map(|timeout| start_time + timeout);
        let Some(status) = wait_until(&mut child, deadline).map_err(spawn_error)? else {
            kill_process_group(&mut child);
            let _ = child.wait();

            tracing::debug!(program = %request.program, "killed after timeout");

            // The pipe readers are left to finish on their own: a descendant that
            // escaped the process group may still hold the pipes open.
            return Err(StepError::ProcessTimeout {
                program: request.program.clone(),
                timeout: request.timeout.unwrap_or_default(),
            });
        };

        let duration = start_time.elapsed();
        let outcome = ExitOutcome::from_status(status);
        tracing::debug!(program = %request.program, %outcome, ?duration, "process finished");

        Ok(RunResult {
            outcome,
            stdout: collect(stdout),
            stderr: collect(stderr),
            duration,
        })
    }
}

/// Reads a pipe to its end on a separate thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = vec![];
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Waits for `child` to exit. Returns `None` once `deadline` passes first.
fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Kills `child` along with every process it started in its session.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = i32::try_from(child.id()) {
        let group = nix::unistd::Pid::from_raw(pid);
        if nix::sys::signal::killpg(group, nix::sys::signal::Signal::SIGKILL).is_ok() {
            return;
        }
    }

    let _ = child.kill();
}
