//! Bounded subprocess execution
//!
//! Every external tool (the device bridge, window-manager utilities) goes
//! through [`CommandRunner`], so callers get a uniform timeout and can be
//! tested against a scripted runner.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use super::ControllerError;

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Successful output with the given stdout, for scripted runners
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }
}

/// Runs a program to completion within a time limit
pub trait CommandRunner: Send + Sync {
    /// Run `program args...`. A process still alive at `timeout` is killed
    /// and reported as [`ControllerError::CommandTimeout`]. A non-zero exit
    /// is NOT an error at this level.
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ControllerError>;
}

/// Runner backed by real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, ControllerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes off-thread; a full pipe would stall the child.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ControllerError::CommandTimeout(
                    describe(program, args),
                    timeout,
                ));
            }
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout.and_then(|h| h.join().ok()).unwrap_or_default(),
            stderr: stderr.and_then(|h| h.join().ok()).unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Human-readable command line for logs and errors
pub fn describe(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Owned argument list from string slices
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(
            describe("adb", &args(&["-s", "emu", "shell", "wm", "size"])),
            "adb -s emu shell wm size"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run("sh", &args(&["-c", "echo hi; echo err 1>&2; exit 3"]), Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout_text().trim(), "hi");
        assert_eq!(out.stderr_text(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_times_out() {
        let err = SystemRunner
            .run("sleep", &args(&["5"]), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ControllerError::CommandTimeout(_, _)));
    }
}
