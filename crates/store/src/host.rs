//! Delegation of reference components to the host package manager.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ExchangeError, Result};

#[async_trait]
pub trait HostPackageManager: Send + Sync {
    /// Install `package@version` into the project at `project_root`
    async fn install(&self, package: &str, version: &str, project_root: &Path) -> Result<()>;
}

/// Runs `<program> install <package>@<version>` in the project root
#[derive(Debug, Clone)]
pub struct CommandPackageManager {
    program: String,
    install_args: Vec<String>,
}

impl Default for CommandPackageManager {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl CommandPackageManager {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            install_args: vec!["install".to_string()],
        }
    }

    pub fn with_install_args(mut self, args: Vec<String>) -> Self {
        self.install_args = args;
        self
    }

    fn command_line(&self, package_spec: &str) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.install_args.iter().cloned());
        parts.push(package_spec.to_string());
        parts.join(" ")
    }
}

#[async_trait]
impl HostPackageManager for CommandPackageManager {
    async fn install(&self, package: &str, version: &str, project_root: &Path) -> Result<()> {
        let package_spec = format!("{}@{}", package, version);
        let command_line = self.command_line(&package_spec);
        info!("Installing reference package: {}", command_line);

        let output = Command::new(&self.program)
            .args(&self.install_args)
            .arg(&package_spec)
            .current_dir(project_root)
            .output()
            .await
            .map_err(|e| ExchangeError::HostPackageManager {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExchangeError::HostPackageManager {
                command: command_line,
                message: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }

        debug!("{} finished", command_line);
        Ok(())
    }
}
