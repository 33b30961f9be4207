use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ids::HostName;
use crate::error::{Error, Result};

/// Captured result of one remote command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution channel toward a cluster host.
///
/// `execute` resolves with the captured output whenever the command ran,
/// regardless of its exit code. `Err` is reserved for transport failures
/// where the command never reached the host.
#[async_trait]
pub trait HostConnection: std::fmt::Debug + Send + Sync {
    async fn execute(&self, argv: &[String], host: &HostName) -> Result<CommandOutput>;
}

/// Executes commands through a local bridge program, typically a script
/// wrapping a remote shell. The target host is passed in the
/// `CRM_TARGET_HOST` environment variable for the bridge to pick up.
#[derive(Debug, Default)]
pub struct ShellConnection;

#[async_trait]
impl HostConnection for ShellConnection {
    async fn execute(&self, argv: &[String], host: &HostName) -> Result<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::ValidationError("Cannot execute an empty command line".to_string()));
        };

        let output = tokio::process::Command::new(program)
            .args(args)
            .env("CRM_TARGET_HOST", host.as_str())
            .output()
            .await
            .map_err(|e| Error::ConnectionError { host: host.to_string(), reason: e.to_string() })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
