//! Build definition synthesis
//!
//! Renders the throwaway Dockerfiles that copy data between a BuildKit cache
//! mount and a plain filesystem location. Rendering is pure; callers decide
//! whether the text is written to a file or piped to the builder.

use crate::cache::job::{Direction, BUILDSTAMP};
use crate::cache::mount::CacheMount;
use crate::error::{DanceError, DanceResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where extracted data is staged inside the build
pub const STAGING_ROOT: &str = "/cache-store";

/// Where injected host data is bound inside the build
pub const INJECT_ROOT: &str = "/cache-in";

const STAGE_NAME: &str = "cache-stage";

/// A cache mount and the build-side path holding its host copy
#[derive(Debug, Clone)]
pub struct StagedMount<'a> {
    pub mount: &'a CacheMount,
    /// Absolute path inside the build
    pub staging: String,
    /// Named build context supplying the host data (batch inject only)
    pub context: Option<String>,
}

impl StagedMount<'_> {
    /// Location of this mount's data once the build output is recovered
    /// under `output_dir`
    pub fn recovered_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.staging.trim_start_matches('/'))
    }

    fn bind_args(&self) -> String {
        match &self.context {
            Some(context) => format!("type=bind,from={},target={}", context, self.staging),
            None => format!("type=bind,source=.,target={}", self.staging),
        }
    }
}

/// Assign staging locations to `mounts`
///
/// A single-mount job stages directly at the root; a batch job gives each
/// mount its own subdirectory named after its staging key.
pub fn stage(
    direction: Direction,
    mounts: &[CacheMount],
    batch: bool,
) -> DanceResult<Vec<StagedMount<'_>>> {
    let root = match direction {
        Direction::Extract => STAGING_ROOT,
        Direction::Inject => INJECT_ROOT,
    };

    if !batch {
        return Ok(mounts
            .iter()
            .map(|mount| StagedMount {
                mount,
                staging: root.to_string(),
                context: None,
            })
            .collect());
    }

    let mut seen = HashSet::new();
    mounts
        .iter()
        .map(|mount| {
            let key = mount.staging_key();
            if !seen.insert(key.clone()) {
                return Err(DanceError::config(
                    mount.source.display().to_string(),
                    format!("staging key '{}' is used by another mount in this batch", key),
                ));
            }
            Ok(StagedMount {
                mount,
                staging: format!("{}/{}", root, key),
                context: (direction == Direction::Inject).then(|| format!("src-{}", key)),
            })
        })
        .collect()
}

/// Render a definition copying each cache mount into its staging path
///
/// With `export_stage` set, a final `FROM scratch` stage keeps only the
/// staging root so a local export contains nothing but cache data.
pub fn render_extract(image: &str, staged: &[StagedMount<'_>], export_stage: bool) -> String {
    let mut lines = Vec::new();

    lines.push(format!("FROM {} AS {}", image, STAGE_NAME));
    lines.push(format!("COPY {} {}", BUILDSTAMP, BUILDSTAMP));

    let mounts = staged
        .iter()
        .map(|s| format!("--mount={}", s.mount.mount_args()))
        .collect::<Vec<_>>();
    let commands = staged
        .iter()
        .flat_map(|s| {
            [
                format!("mkdir -p {}", s.staging),
                format!("(cp -p -R {}/. {}/ || true)", s.mount.target_path(), s.staging),
            ]
        })
        .collect::<Vec<_>>();
    lines.push(run_line(&mounts, &commands));

    if export_stage {
        lines.push("FROM scratch".to_string());
        lines.push(format!(
            "COPY --from={} {} {}",
            STAGE_NAME, STAGING_ROOT, STAGING_ROOT
        ));
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Render a definition copying staged host data into each cache mount
///
/// Ownership is restored with `chown -R` when the mount sets a uid or gid.
pub fn render_inject(image: &str, staged: &[StagedMount<'_>]) -> String {
    let mut lines = Vec::new();

    lines.push(format!("FROM {}", image));
    lines.push(format!("COPY {} {}", BUILDSTAMP, BUILDSTAMP));

    let mounts = staged
        .iter()
        .flat_map(|s| {
            [
                format!("--mount={}", s.mount.mount_args()),
                format!("--mount={}", s.bind_args()),
            ]
        })
        .collect::<Vec<_>>();
    let commands = staged
        .iter()
        .map(|s| {
            let target = s.mount.target_path();
            let mut copy = format!("cp -p -R {}/. {}", s.staging, target);
            let (uid, gid) = (s.mount.uid(), s.mount.gid());
            if !uid.is_empty() || !gid.is_empty() {
                copy.push_str(&format!(" && chown -R {}:{} {}", uid, gid, target));
            }
            format!("({} || true)", copy)
        })
        .collect::<Vec<_>>();
    lines.push(run_line(&mounts, &commands));

    lines.push(String::new());
    lines.join("\n")
}

fn run_line(mounts: &[String], commands: &[String]) -> String {
    let mut run = String::from("RUN ");
    for mount in mounts {
        run.push_str(mount);
        run.push_str(" \\\n    ");
    }
    run.push_str(&commands.join(" \\\n    && "));
    run
}
