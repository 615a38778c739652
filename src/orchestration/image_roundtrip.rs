//! Image round-trip export
//!
//! Builds and loads a job-scoped image, creates (but never starts) a
//! container from it, and streams the staging root out with
//! `docker cp ... - | tar -x`.

use crate::cache::definition::STAGING_ROOT;
use crate::cache::Job;
use crate::error::{best_effort, DanceError, DanceResult};
use crate::orchestration::driver::{BuildDriver, BuildRequest, Buildx};
use crate::orchestration::{run_piped, CommandLine};
use async_trait::async_trait;
use tracing::debug;

/// Driver loading an image and copying the tree out of a container
pub struct ImageRoundTrip {
    buildx: Buildx,
    archive: CommandLine,
}

impl ImageRoundTrip {
    pub fn new(buildx: Buildx, archive_prefix: &[String]) -> DanceResult<Self> {
        Ok(Self {
            buildx,
            archive: CommandLine::from_prefix("builder.archive_command", archive_prefix)?,
        })
    }
}

#[async_trait]
impl BuildDriver for ImageRoundTrip {
    fn exports_scratch_stage(&self) -> bool {
        // The container needs the utility stage to be created from
        false
    }

    async fn build(&self, request: &BuildRequest<'_>) -> DanceResult<()> {
        let job = request.job;
        let mut output_args = vec!["--tag".to_string(), job.image_tag.clone()];
        if request.export_to.is_some() {
            output_args.push("--load".to_string());
        }
        self.buildx.invoke(request, &output_args).await?;

        let Some(dest) = request.export_to else {
            return Ok(());
        };

        let docker = self.buildx.docker();
        best_effort(
            "removal of leftover container",
            docker.remove_container(&job.container_name).await,
        );
        docker
            .create_container(&job.container_name, &job.image_tag)
            .await
            .map_err(|e| DanceError::builder(&job.id, e))?;

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| DanceError::io(format!("creating {}", dest.display()), e))?;
        let extract = self
            .archive
            .clone()
            .args(["-x", "-C"])
            .arg(dest.display().to_string());
        run_piped(&docker.copy_out(&job.container_name, STAGING_ROOT), &extract)
            .await
            .map_err(|e| DanceError::builder(&job.id, e))?;
        debug!("Recovered build output into {}", dest.display());

        best_effort(
            "container removal",
            docker.remove_container(&job.container_name).await,
        );
        Ok(())
    }

    async fn cleanup(&self, job: &Job) -> DanceResult<()> {
        let docker = self.buildx.docker();
        let container = docker.remove_container(&job.container_name).await;
        let image = docker.remove_image(&job.image_tag).await;
        container.and(image)
    }

    fn name(&self) -> &'static str {
        "image round-trip"
    }
}
