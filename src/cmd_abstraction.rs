//! Command execution abstraction for testability.
//!
//! This module provides a trait-based abstraction over command execution,
//! allowing unit tests to mock `nft` invocations without touching the host
//! firewall.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

/// Default deadline for a single command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// The real implementation spawns system commands; tests use
/// `MockCommandExecutor` to script `nft` output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    ///
    /// # Arguments
    /// * `cmd` - The command to execute (e.g., "/usr/sbin/nft")
    /// * `args` - The arguments to pass to the command
    ///
    /// # Returns
    /// A `CommandOutput` with stdout, stderr, and success status. An `Err`
    /// means the command could not be run or did not finish in time.
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs real system commands, killing any that outlive the deadline.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    timeout: Duration,
}

impl RealCommandExecutor {
    /// Create an executor with the default deadline
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Create an executor with a custom per-command deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.with_context(|| format!("{} {}", cmd, args.join(" ")))?,
            Err(_) => anyhow::bail!(
                "{} {} timed out after {}s",
                cmd,
                args.join(" "),
                self.timeout.as_secs_f32()
            ),
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// This is needed because mockall has issues with lifetimes in `&[&str]`,
/// so we use `&[String]` in the trait signature instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
