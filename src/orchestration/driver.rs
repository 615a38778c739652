//! Builder driver abstraction
//!
//! A driver runs one build definition for a job and, when asked, leaves the
//! build's staging root as a plain directory tree on the host.

use crate::cache::Job;
use crate::config::DefinitionInput;
use crate::error::{DanceError, DanceResult};
use crate::orchestration::{run, run_with_input, CommandLine, DockerCli};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One builder invocation
#[derive(Debug)]
pub struct BuildRequest<'a> {
    pub job: &'a Job,
    /// Rendered build definition
    pub definition: &'a str,
    /// Build context directory
    pub context_dir: &'a Path,
    /// Extra named build contexts (`--build-context name=path`)
    pub named_contexts: Vec<(String, PathBuf)>,
    /// Recover the staging root into this directory; `None` runs the build
    /// for its side effects only
    pub export_to: Option<&'a Path>,
}

/// Strategy for turning a build definition into a filesystem tree
#[async_trait]
pub trait BuildDriver: Send + Sync {
    /// Whether extract definitions should end in a `FROM scratch` stage
    fn exports_scratch_stage(&self) -> bool;

    /// Run the build; a non-zero builder exit is a `BuilderExecution` error
    async fn build(&self, request: &BuildRequest<'_>) -> DanceResult<()>;

    /// Remove any image or container created for `job`
    async fn cleanup(&self, job: &Job) -> DanceResult<()>;

    /// Human-readable strategy name
    fn name(&self) -> &'static str;
}

/// `docker buildx build` invocation shared by all drivers
#[derive(Debug, Clone)]
pub struct Buildx {
    docker: DockerCli,
    builder: String,
    input: DefinitionInput,
}

impl Buildx {
    pub fn new(docker: DockerCli, builder: impl Into<String>, input: DefinitionInput) -> Self {
        Self {
            docker,
            builder: builder.into(),
            input,
        }
    }

    pub fn docker(&self) -> &DockerCli {
        &self.docker
    }

    fn base_command(&self, request: &BuildRequest<'_>) -> CommandLine {
        let mut cmd = self
            .docker
            .command()
            .args(["buildx", "build", "--builder", &self.builder]);
        for (name, path) in &request.named_contexts {
            cmd = cmd
                .arg("--build-context")
                .arg(format!("{}={}", name, path.display()));
        }
        cmd
    }

    /// Run the build with driver-specific output arguments
    pub async fn invoke(&self, request: &BuildRequest<'_>, output_args: &[String]) -> DanceResult<()> {
        let job = request.job;
        debug!("Build definition for job {}:\n{}", job.id, request.definition);

        let cmd = self.base_command(request);
        let result = match self.input {
            DefinitionInput::File => {
                tokio::fs::write(&job.definition_path, request.definition)
                    .await
                    .map_err(|e| {
                        DanceError::io(format!("writing {}", job.definition_path.display()), e)
                    })?;
                let cmd = cmd
                    .arg("-f")
                    .arg(job.definition_path.display().to_string())
                    .args(output_args.iter().cloned())
                    .arg(request.context_dir.display().to_string());
                run(&cmd).await
            }
            DefinitionInput::Stdin => {
                let cmd = cmd
                    .args(["-f", "-"])
                    .args(output_args.iter().cloned())
                    .arg(request.context_dir.display().to_string());
                run_with_input(&cmd, request.definition).await
            }
        };

        result.map_err(|e| DanceError::builder(&job.id, e))
    }
}
