//! Concurrency coordinator
//!
//! Fans a transfer out over every cache mount, either as one concurrent job
//! per mount or as a single batched job.

use crate::cache::job::Direction;
use crate::cache::mount::CacheMount;
use crate::cache::transfer::{settle, TransferContext};
use crate::config::JobModel;
use crate::error::{DanceError, DanceResult};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

/// Runs transfers for a set of mounts under one job model
pub struct Coordinator {
    ctx: TransferContext,
    model: JobModel,
}

impl Coordinator {
    pub fn new(ctx: TransferContext, model: JobModel) -> Self {
        Self { ctx, model }
    }

    /// Give every job `timeout` to finish its build and relocation
    ///
    /// Jobs that overrun have their builder killed and are still cleaned up.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ctx.timeout = timeout;
        self
    }

    /// Move every mount in `direction`
    ///
    /// Per-mount jobs all run to completion before failures are reported.
    pub async fn run(&self, direction: Direction, mounts: &[CacheMount]) -> DanceResult<()> {
        check_unique_sources(mounts)?;
        if mounts.is_empty() {
            info!("No cache mounts configured, nothing to {}", direction);
            return Ok(());
        }

        self.dispatch(direction, mounts).await?;

        info!("{} complete for {} cache mount(s)", direction, mounts.len());
        Ok(())
    }

    async fn dispatch(&self, direction: Direction, mounts: &[CacheMount]) -> DanceResult<()> {
        match self.model {
            JobModel::PerMount => {
                let results = join_all(
                    mounts
                        .iter()
                        .map(|mount| self.ctx.transfer_one(direction, mount)),
                )
                .await;
                let errors = results.into_iter().filter_map(Result::err).collect();
                settle(errors, mounts.len())
            }
            JobModel::Batch => self.ctx.transfer_batch(direction, mounts).await,
        }
    }
}

/// Two jobs must never write the same host directory
fn check_unique_sources(mounts: &[CacheMount]) -> DanceResult<()> {
    let mut seen = HashSet::new();
    for mount in mounts {
        if !seen.insert(&mount.source) {
            return Err(DanceError::config(
                mount.source.display().to_string(),
                "cache source listed more than once",
            ));
        }
    }
    Ok(())
}
