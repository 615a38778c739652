//! Direct local-filesystem export

use crate::cache::Job;
use crate::error::DanceResult;
use crate::orchestration::driver::{BuildDriver, BuildRequest, Buildx};
use async_trait::async_trait;

/// Driver using `--output type=local`, the builder writes the tree itself
pub struct LocalExport {
    buildx: Buildx,
}

impl LocalExport {
    pub fn new(buildx: Buildx) -> Self {
        Self { buildx }
    }
}

#[async_trait]
impl BuildDriver for LocalExport {
    fn exports_scratch_stage(&self) -> bool {
        true
    }

    async fn build(&self, request: &BuildRequest<'_>) -> DanceResult<()> {
        let output = match request.export_to {
            Some(dir) => format!("type=local,dest={}", dir.display()),
            None => "type=cacheonly".to_string(),
        };
        self.buildx
            .invoke(request, &["--output".to_string(), output])
            .await
    }

    async fn cleanup(&self, _job: &Job) -> DanceResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local export"
    }
}
