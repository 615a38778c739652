//! Container lifecycle primitives over the docker CLI

use crate::error::{DanceError, DanceResult};
use crate::orchestration::{run, run_captured, CommandLine};
use tracing::debug;

/// The container CLI, invoked through a configurable argv prefix
#[derive(Debug, Clone)]
pub struct DockerCli {
    base: CommandLine,
}

impl DockerCli {
    pub fn new(prefix: Vec<String>) -> DanceResult<Self> {
        Ok(Self {
            base: CommandLine::from_prefix("builder.command", &prefix)?,
        })
    }

    /// Start a command line with the CLI prefix
    pub fn command(&self) -> CommandLine {
        self.base.clone()
    }

    /// Force-remove a container; a missing container is not an error
    pub async fn remove_container(&self, name: &str) -> DanceResult<()> {
        let cmd = self.command().args(["rm", "-f", name]);
        self.force_remove(&cmd, &format!("container {}", name)).await
    }

    /// Force-remove an image tag; a missing image is not an error
    pub async fn remove_image(&self, tag: &str) -> DanceResult<()> {
        let cmd = self.command().args(["image", "rm", "-f", tag]);
        self.force_remove(&cmd, &format!("image {}", tag)).await
    }

    async fn force_remove(&self, cmd: &CommandLine, what: &str) -> DanceResult<()> {
        let output = run_captured(cmd).await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("no such") {
            debug!("{} already absent", what);
            Ok(())
        } else {
            Err(DanceError::cleanup(what, stderr.trim()))
        }
    }

    /// Create a stopped container from `image`
    pub async fn create_container(&self, name: &str, image: &str) -> DanceResult<()> {
        run(&self.command().args(["create", "--name", name, image])).await
    }

    /// `cp` command streaming `path` from a container to stdout as a tar archive
    pub fn copy_out(&self, name: &str, path: &str) -> CommandLine {
        self.command().args(["cp", &format!("{}:{}", name, path), "-"])
    }
}
