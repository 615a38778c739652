//! Driver factory
//!
//! Picks the builder driver named by configuration.

use crate::config::{BuilderConfig, OutputStrategy};
use crate::error::DanceResult;
use crate::orchestration::docker::DockerCli;
use crate::orchestration::driver::{BuildDriver, Buildx};
use crate::orchestration::image_roundtrip::ImageRoundTrip;
use crate::orchestration::local_export::LocalExport;
use std::sync::Arc;

/// Create the builder driver selected by `config.output`
pub fn create_driver(config: &BuilderConfig) -> DanceResult<Arc<dyn BuildDriver>> {
    let docker = DockerCli::new(config.command.clone())?;
    let buildx = Buildx::new(docker, &config.name, config.definition_input);

    match config.output {
        OutputStrategy::Local => Ok(Arc::new(LocalExport::new(buildx))),
        OutputStrategy::Image => Ok(Arc::new(ImageRoundTrip::new(
            buildx,
            &config.archive_command,
        )?)),
    }
}
