//! External command execution

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cf_core::AttachmentOptions;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CommandLineError;

/// Runs external programs on behalf of processors
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `args` and return its stdout.
    ///
    /// Fails with [`CommandLineError::UnexpectedExit`] when the exit code is
    /// not one of `expected_exit_codes`.
    async fn run(
        &self,
        command: &str,
        args: &[String],
        expected_exit_codes: &[i32],
    ) -> Result<String, CommandLineError>;
}

/// Runs commands with `tokio::process`, without a shell
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    command_path: Option<PathBuf>,
    swallow_stderr: bool,
    timeout: Option<Duration>,
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::from_options(&AttachmentOptions::default())
    }
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &AttachmentOptions) -> Self {
        Self {
            command_path: options.command_path.clone(),
            swallow_stderr: options.swallow_stderr,
            timeout: options.command_timeout(),
        }
    }

    pub fn with_command_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.command_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_swallow_stderr(mut self, swallow: bool) -> Self {
        self.swallow_stderr = swallow;
        self
    }

    /// Prefix a command with the configured command path
    pub fn path_for_command(&self, command: &str) -> PathBuf {
        match &self.command_path {
            Some(dir) => dir.join(command),
            None => Path::new(command).to_path_buf(),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        expected_exit_codes: &[i32],
    ) -> Result<String, CommandLineError> {
        let program = self.path_for_command(command);
        debug!(command = %program.display(), args = ?args, "Running command");

        let stderr = if self.swallow_stderr {
            Stdio::null()
        } else {
            Stdio::piped()
        };

        let child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandLineError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout kills the child.
        let waited = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| {
                    warn!(command = %command, ?timeout, "Command timed out");
                    CommandLineError::TimedOut {
                        command: command.to_string(),
                        timeout,
                    }
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| CommandLineError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let code = output.status.code();
        if !code.is_some_and(|code| expected_exit_codes.contains(&code)) {
            return Err(CommandLineError::UnexpectedExit {
                command: command.to_string(),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
