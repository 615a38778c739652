//! Transfer orchestration
//!
//! Drives one job through its lifecycle: prepare scratch, render the build
//! definition, run the builder, move data into place, clean up. Every job
//! runs inside a tracing span so its log lines are grouped by job id.

use crate::cache::definition::{render_extract, render_inject, stage, StagedMount};
use crate::cache::job::{write_buildstamp, Direction, Job, JobState};
use crate::cache::mount::CacheMount;
use crate::cache::relocate::{discard_source, relocate_extracted, DestinationRemover};
use crate::error::{best_effort, DanceError, DanceResult};
use crate::orchestration::{BuildDriver, BuildRequest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};

/// Everything a job needs besides its mounts
pub struct TransferContext {
    pub scratch_root: PathBuf,
    /// Utility image the copy step runs in
    pub image: String,
    pub driver: Arc<dyn BuildDriver>,
    pub remover: DestinationRemover,
    /// Deadline for each job's build and relocation; cleanup always runs
    pub timeout: Option<Duration>,
}

impl TransferContext {
    /// Run a dedicated job for one mount
    pub async fn transfer_one(&self, direction: Direction, mount: &CacheMount) -> DanceResult<()> {
        let job = Job::allocate(&self.scratch_root, direction, &mount.source);
        self.execute(job, std::slice::from_ref(mount), false).await
    }

    /// Run a single job covering every mount
    pub async fn transfer_batch(&self, direction: Direction, mounts: &[CacheMount]) -> DanceResult<()> {
        let job = Job::batch(&self.scratch_root, direction);
        self.execute(job, mounts, true).await
    }

    async fn execute(&self, mut job: Job, mounts: &[CacheMount], batch: bool) -> DanceResult<()> {
        // Layout problems surface before anything is spawned
        let staged = stage(job.direction, mounts, batch)?;

        let span = info_span!("job", id = %job.id, direction = %job.direction);
        async move {
            info!(
                "Starting {} of {} cache mount(s) via {}",
                job.direction,
                staged.len(),
                self.driver.name()
            );
            let work = async {
                match job.direction {
                    Direction::Extract => self.extract(&mut job, &staged).await,
                    Direction::Inject => self.inject(&mut job, &staged, batch).await,
                }
            };
            // Dropping the work on expiry kills the builder via kill_on_drop
            let result = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                    Err(DanceError::Timeout {
                        secs: limit.as_secs(),
                    })
                }),
                None => work.await,
            };
            self.finish(&mut job, result).await
        }
        .instrument(span)
        .await
    }

    async fn extract(&self, job: &mut Job, staged: &[StagedMount<'_>]) -> DanceResult<()> {
        job.prepare_scratch().await?;
        write_buildstamp(&job.scratch_dir).await?;

        let definition = render_extract(&self.image, staged, self.driver.exports_scratch_stage());
        job.advance(JobState::DefinitionReady);

        let output = job.output_dir();
        {
            let request = BuildRequest {
                job: &*job,
                definition: &definition,
                context_dir: &job.scratch_dir,
                named_contexts: Vec::new(),
                export_to: Some(&output),
            };
            self.driver.build(&request).await?;
        }
        job.advance(JobState::BuildExecuted);

        // Mounts relocate independently; one failure does not stop the rest
        let mut errors = Vec::new();
        for s in staged {
            let dest = &s.mount.source;
            match relocate_extracted(&s.recovered_path(&output), dest, &self.remover).await {
                Ok(()) => info!("Extracted {} into {}", s.mount.target_path(), dest.display()),
                Err(e) => {
                    error!("{}", e);
                    errors.push(e);
                }
            }
        }
        settle(errors, staged.len())?;
        job.advance(JobState::Relocated);
        Ok(())
    }

    async fn inject(&self, job: &mut Job, staged: &[StagedMount<'_>], batch: bool) -> DanceResult<()> {
        job.prepare_scratch().await?;

        // A missing source injects an empty tree
        for s in staged {
            tokio::fs::create_dir_all(&s.mount.source).await.map_err(|e| {
                DanceError::io(format!("creating {}", s.mount.source.display()), e)
            })?;
        }

        let context_dir = match (batch, staged) {
            (false, [single]) => single.mount.source.clone(),
            _ => job.scratch_dir.clone(),
        };
        write_buildstamp(&context_dir).await?;

        let definition = render_inject(&self.image, staged);
        job.advance(JobState::DefinitionReady);

        {
            let request = BuildRequest {
                job: &*job,
                definition: &definition,
                context_dir: &context_dir,
                named_contexts: staged
                    .iter()
                    .filter_map(|s| s.context.clone().map(|c| (c, s.mount.source.clone())))
                    .collect(),
                export_to: None,
            };
            self.driver.build(&request).await?;
        }
        job.advance(JobState::BuildExecuted);

        // The cache already holds the data, losing the host copy is harmless
        for s in staged {
            discard_source(&s.mount.source).await;
            info!("Injected {} into {}", s.mount.source.display(), s.mount.target_path());
        }
        job.advance(JobState::Relocated);
        Ok(())
    }

    async fn finish(&self, job: &mut Job, result: DanceResult<()>) -> DanceResult<()> {
        if let Err(e) = &result {
            job.advance(JobState::Failed);
            error!("Job {} failed: {}", job.id, e);
        }

        best_effort("builder cleanup", self.driver.cleanup(job).await);
        best_effort("scratch removal", job.remove_scratch().await);

        if result.is_ok() {
            job.advance(JobState::CleanedUp);
            info!("Job {} complete", job.id);
        }
        result
    }
}

/// Fold per-mount failures into one result
///
/// A lone mount reports its own error; anything wider reports an aggregate.
pub(crate) fn settle(mut errors: Vec<DanceError>, total: usize) -> DanceResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 if total == 1 => Err(errors.remove(0)),
        failed => Err(DanceError::Aggregate {
            failed,
            total,
            errors,
        }),
    }
}
