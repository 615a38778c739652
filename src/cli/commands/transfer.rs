//! Inject and extract commands

use crate::cache::{Coordinator, DestinationRemover, Direction, TransferContext};
use crate::cli::args::{ExtractArgs, TransferArgs};
use crate::config::Config;
use crate::error::{DanceError, DanceResult};
use crate::orchestration::create_driver;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Step state file read by GitHub Actions post steps
const GITHUB_STATE: &str = "GITHUB_STATE";

/// Execute the inject command
pub async fn inject(args: TransferArgs, config: &Config) -> DanceResult<()> {
    let mut config = config.clone();
    args.apply(&mut config)?;

    // Armed first so a partial inject still gets extracted afterwards
    if let Some(state) = std::env::var_os(GITHUB_STATE) {
        mark_post_step(Path::new(&state)).await?;
    }

    transfer(&config, Direction::Inject).await
}

/// Execute the extract command
pub async fn extract(args: ExtractArgs, config: &Config) -> DanceResult<()> {
    let mut config = config.clone();
    args.apply(&mut config)?;

    if config.transfer.skip_extraction {
        info!("Skipping cache extraction");
        return Ok(());
    }

    transfer(&config, Direction::Extract).await
}

async fn transfer(config: &Config, direction: Direction) -> DanceResult<()> {
    // Validate everything before the first process is spawned
    let mounts = config.cache_mounts()?;
    let driver = create_driver(&config.builder)?;
    debug!(
        "Transferring {} mount(s) with {} ({:?})",
        mounts.len(),
        driver.name(),
        config.transfer.job_model
    );

    let ctx = TransferContext {
        scratch_root: config.transfer.scratch_dir.clone(),
        image: config.builder.image.clone(),
        driver,
        remover: DestinationRemover::new(&config.transfer.privileged_command),
        timeout: None,
    };
    let timeout = match config.transfer.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Coordinator::new(ctx, config.transfer.job_model)
        .with_timeout(timeout)
        .run(direction, &mounts)
        .await
}

/// Tell the post step that extraction should run
async fn mark_post_step(state_file: &Path) -> DanceResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(state_file)
        .await
        .map_err(|e| DanceError::io(format!("opening {}", state_file.display()), e))?;
    file.write_all(b"POST=true\n")
        .await
        .map_err(|e| DanceError::io(format!("writing {}", state_file.display()), e))?;
    file.flush()
        .await
        .map_err(|e| DanceError::io(format!("writing {}", state_file.display()), e))
}
