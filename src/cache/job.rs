//! Transfer jobs
//!
//! A job owns one scratch directory and the job-scoped names of any image or
//! container the builder driver creates for it.

use crate::cache::relocate::remove_tree;
use crate::error::{DanceError, DanceResult};
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest slug kept from a cache source path
pub(crate) const MAX_SLUG_LEN: usize = 40;

/// Length of the random job id suffix
const SUFFIX_LEN: usize = 8;

/// Job id used for the single job of a batch run
pub const BATCH_JOB_ID: &str = "batch";

/// Name of the cache-busting timestamp file
pub const BUILDSTAMP: &str = "buildstamp";

/// Which way data moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host directory into the BuildKit cache mount
    Inject,
    /// BuildKit cache mount out to the host directory
    Extract,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inject => write!(f, "inject"),
            Self::Extract => write!(f, "extract"),
        }
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    ScratchPrepared,
    DefinitionReady,
    BuildExecuted,
    Relocated,
    CleanedUp,
    Failed,
}

/// Reduce a path to a lowercase, filesystem-safe slug of at most `max_len`
/// characters, keeping the trailing (most specific) part.
pub(crate) fn slugify(input: &str, max_len: usize) -> String {
    let trimmed = input.trim_start_matches(['/', '\\']);
    let mut slug = String::with_capacity(trimmed.len());
    let mut in_separator = false;

    for c in trimmed.chars() {
        if c == '/' || c == '\\' {
            if !in_separator {
                slug.push('-');
            }
            in_separator = true;
            continue;
        }
        in_separator = false;

        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            slug.push(c.to_ascii_lowercase());
        } else {
            slug.push('-');
        }
    }

    // Only ASCII remains, so byte offsets are char offsets
    slug[slug.len().saturating_sub(max_len)..].to_string()
}

/// Derive a job id from a cache source path plus a random suffix
pub fn job_id(cache_source: &str) -> String {
    let slug = slugify(cache_source, MAX_SLUG_LEN);
    let slug = if slug.is_empty() { "cache" } else { &slug };
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &unique[..SUFFIX_LEN])
}

/// One transfer job and the transient resources it owns
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub direction: Direction,
    pub scratch_dir: PathBuf,
    pub definition_path: PathBuf,
    pub image_tag: String,
    pub container_name: String,
    state: JobState,
}

impl Job {
    /// Allocate a job with a fresh id for one cache source
    pub fn allocate(scratch_root: &Path, direction: Direction, source: &Path) -> Self {
        Self::with_id(
            scratch_root,
            direction,
            job_id(&source.to_string_lossy()),
        )
    }

    /// The fixed job used by a batch run
    pub fn batch(scratch_root: &Path, direction: Direction) -> Self {
        Self::with_id(scratch_root, direction, BATCH_JOB_ID.to_string())
    }

    fn with_id(scratch_root: &Path, direction: Direction, id: String) -> Self {
        let scratch_dir = scratch_root.join(&id);
        Self {
            definition_path: scratch_dir.join(format!("Dockerfile.{}", direction)),
            image_tag: format!("cache-dance:{}-{}", direction, id),
            container_name: format!("cache-dance-{}-{}", direction, id),
            scratch_dir,
            direction,
            id,
            state: JobState::Init,
        }
    }

    /// Where the builder output is recovered to
    pub fn output_dir(&self) -> PathBuf {
        self.scratch_dir.join("output")
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to the next lifecycle state
    pub fn advance(&mut self, next: JobState) {
        debug!(job = %self.id, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Remove any stale scratch directory and recreate it empty
    pub async fn prepare_scratch(&mut self) -> DanceResult<()> {
        remove_tree(&self.scratch_dir).await.map_err(|e| {
            DanceError::io(
                format!("clearing scratch directory {}", self.scratch_dir.display()),
                e,
            )
        })?;
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| {
                DanceError::io(
                    format!("creating scratch directory {}", self.scratch_dir.display()),
                    e,
                )
            })?;
        self.advance(JobState::ScratchPrepared);
        Ok(())
    }

    /// Remove the scratch directory
    pub async fn remove_scratch(&self) -> DanceResult<()> {
        remove_tree(&self.scratch_dir)
            .await
            .map_err(|e| DanceError::cleanup(self.scratch_dir.display().to_string(), e.to_string()))
    }
}

/// Write the cache-busting timestamp into `dir`
pub async fn write_buildstamp(dir: &Path) -> DanceResult<()> {
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let path = dir.join(BUILDSTAMP);
    tokio::fs::write(&path, &stamp)
        .await
        .map_err(|e| DanceError::io(format!("writing {}", path.display()), e))?;
    debug!("Buildstamp written to {}: {}", path.display(), stamp);
    Ok(())
}
