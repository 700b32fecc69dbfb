use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Data written to the child's stdin; `None` connects stdin to the null device
    pub stdin: Option<String>,
}

impl ProcessCommand {
    /// The command line as it would be typed, for logs and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// Return stdout when the process succeeded, otherwise the failure as an error
    pub fn into_stdout(self) -> Result<String, ProcessError> {
        match self.status {
            ExitStatus::Success => Ok(self.stdout),
            ExitStatus::Error(code) => Err(ProcessError::ExitCode {
                code,
                stderr: self.stderr.trim().to_string(),
            }),
            ExitStatus::Signal(signal) => Err(ProcessError::Signal(signal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

/// Launches external processes and captures their output.
///
/// Blocking by design: the only caller is template expansion, which runs on a
/// blocking thread.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct StdProcessRunner;

impl StdProcessRunner {
    /// Configure the command with arguments, environment and stdio
    fn configure_command(command: &ProcessCommand) -> std::process::Command {
        let mut cmd = std::process::Command::new(&command.program);
        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        if command.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, program: &str) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(program.to_string())
        } else {
            ProcessError::Io(error)
        }
    }

    /// Convert process exit status to our ExitStatus enum
    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitStatus::Signal(signal),
            None => ExitStatus::Error(1),
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }
}

impl ProcessRunner for StdProcessRunner {
    fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        tracing::debug!("Executing subprocess: {}", command.display());
        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        let start = Instant::now();
        let mut child = Self::configure_command(&command)
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command.program))?;

        // Feed stdin from a separate thread so a chatty child cannot deadlock
        // against a full stdout pipe.
        let writer = match (child.stdin.take(), command.stdin.clone()) {
            (Some(mut stdin), Some(data)) => {
                tracing::trace!("Stdin provided: {} bytes", data.len());
                Some(std::thread::spawn(move || stdin.write_all(data.as_bytes())))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;
        if let Some(handle) = writer {
            if let Ok(Err(e)) = handle.join() {
                // A child that exits without reading its input closes the pipe early
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(ProcessError::Io(e));
                }
            }
        }

        let result = ProcessOutput {
            status: Self::parse_exit_status(output.status),
            stdout: String::from_utf8(output.stdout)?,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        };

        match &result.status {
            ExitStatus::Success => tracing::debug!(
                "Subprocess completed successfully in {:?}: {}",
                result.duration,
                command.display()
            ),
            ExitStatus::Error(code) => tracing::debug!(
                "Subprocess failed with exit code {} in {:?}: {}",
                code,
                result.duration,
                command.display()
            ),
            ExitStatus::Signal(signal) => tracing::warn!(
                "Subprocess terminated by signal {}: {}",
                signal,
                command.display()
            ),
        }

        Ok(result)
    }
}
