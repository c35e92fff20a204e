use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors raised by a [`ProcessRunner`].
///
/// A launch failure is an environment problem (missing binary, bad working
/// directory) and is always distinct from the launched process exiting with a
/// non-zero status, which is reported inside [`RunOutput`] instead.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Cannot run an empty command line")]
    EmptyCommand,
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("Failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// One external process invocation: argv, optional working directory and an
/// optional wall-clock limit. `timeout: None` means wait indefinitely.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            working_dir: None,
            timeout: None,
        }
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}

/// Captured result of one completed (or killed) process.
///
/// `log` holds the captured stdout followed by the captured stderr. The two
/// streams are drained from separate pipes, so their relative interleaving is
/// not preserved; consumers of the log operate line by line and do not depend
/// on cross-stream ordering.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub log: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Capability to run external processes.
///
/// Everything that shells out (build commands, the subject program, the
/// fuzzing engine) goes through this trait, so the triage logic above it can
/// be exercised in tests with scripted outputs and no real subprocess.
pub trait ProcessRunner {
    fn run(&mut self, spec: &ProcessSpec) -> Result<RunOutput, ProcessError>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        SystemRunner
    }

    fn wait_with_timeout(
        child: &mut Child,
        timeout: Option<Duration>,
        program: &str,
    ) -> Result<(ExitStatus, bool), ProcessError> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok((status, false)),
                Ok(None) => {
                    if let Some(limit) = timeout {
                        if start.elapsed() > limit {
                            log::warn!("'{program}' exceeded {limit:?}, killing");
                            if let Err(e) = child.kill() {
                                return Err(ProcessError::Wait {
                                    program: program.to_string(),
                                    source: e,
                                });
                            }
                            let status = child.wait().map_err(|e| ProcessError::Wait {
                                program: program.to_string(),
                                source: e,
                            })?;
                            return Ok((status, true));
                        }
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(ProcessError::Wait {
                        program: program.to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}

fn drain_pipe(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        // A read error here means the child died mid-write; keep what we got.
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

impl ProcessRunner for SystemRunner {
    fn run(&mut self, spec: &ProcessSpec) -> Result<RunOutput, ProcessError> {
        if spec.command.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }

        let mut cmd = Command::new(&spec.command[0]);
        if spec.command.len() > 1 {
            cmd.args(&spec.command[1..]);
        }
        if let Some(cwd) = &spec.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        log::debug!("spawning {:?}", spec.command);
        let mut child = cmd.spawn().map_err(|e| ProcessError::Launch {
            program: spec.program().to_string(),
            source: e,
        })?;

        // Drain both pipes on their own threads while polling for exit, so a
        // chatty child never blocks on a full pipe buffer.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain_pipe(stdout_pipe));
        let stderr_reader = thread::spawn(move || drain_pipe(stderr_pipe));

        let (status, timed_out) = Self::wait_with_timeout(&mut child, spec.timeout, spec.program())?;

        let mut log_text = stdout_reader.join().unwrap_or_default();
        log_text.push_str(&stderr_reader.join().unwrap_or_default());

        let mut output = RunOutput {
            log: log_text,
            exit_code: status.code(),
            signal: None,
            timed_out,
        };
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            output.signal = status.signal();
        }
        Ok(output)
    }
}
