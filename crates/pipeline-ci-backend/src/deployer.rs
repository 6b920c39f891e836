//! `PipelineDeployer`: hands a rendered [`Pipeline`] to its configured CI
//! backend, mirroring `concourse.replicator.ConcourseDeployer.deploy` down to
//! the set-pipeline save-race retry.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use pipeline_config::{CiTargetKey, DeployResult, DeployStatus, Pipeline};
use rand::Rng;
use tracing::{info, warn};

use crate::client::CiBackendClient;
use crate::model::SetPipelineResult;

const SAVE_RACE_CONFLICT_STATUS: u16 = 500;
const SAVE_RACE_CONFLICT_BODY: &str = "failed to save config: comparison with existing config failed during save";

#[async_trait]
pub trait PipelineDeployer: Send + Sync {
    async fn deploy(&self, pipeline: &Pipeline) -> DeployResult;
}

/// Deploys nothing; used by dry-run CLI invocations.
pub struct NoOpDeployer;

#[async_trait]
impl PipelineDeployer for NoOpDeployer {
    async fn deploy(&self, pipeline: &Pipeline) -> DeployResult {
        info!(pipeline = %pipeline.name, "skipped deployment (no-op)");
        DeployResult {
            pipeline_name: pipeline.name.clone(),
            ci_target: pipeline.ci_target.clone(),
            status: DeployStatus::SUCCEEDED,
            error: None,
        }
    }
}

/// Writes the rendered pipeline definition to a file instead of a live
/// backend, used by local dry-runs and golden-file tests.
pub struct FilesystemDeployer {
    base_dir: PathBuf,
}

impl FilesystemDeployer {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, pipeline: &Pipeline) -> PathBuf {
        self.base_dir.join(&pipeline.name)
    }
}

#[async_trait]
impl PipelineDeployer for FilesystemDeployer {
    async fn deploy(&self, pipeline: &Pipeline) -> DeployResult {
        let path = self.path_for(pipeline);
        let body = match serde_yaml::to_string(&pipeline.rendered) {
            Ok(body) => body,
            Err(e) => {
                warn!(pipeline = %pipeline.name, error = %e, "failed to serialize pipeline");
                return DeployResult {
                    pipeline_name: pipeline.name.clone(),
                    ci_target: pipeline.ci_target.clone(),
                    status: DeployStatus::FAILED,
                    error: Some(e.to_string()),
                };
            }
        };
        match tokio::fs::write(&path, body).await {
            Ok(()) => DeployResult {
                pipeline_name: pipeline.name.clone(),
                ci_target: pipeline.ci_target.clone(),
                status: DeployStatus::SUCCEEDED,
                error: None,
            },
            Err(e) => {
                warn!(pipeline = %pipeline.name, path = %path.display(), error = %e, "failed to write pipeline file");
                DeployResult {
                    pipeline_name: pipeline.name.clone(),
                    ci_target: pipeline.ci_target.clone(),
                    status: DeployStatus::FAILED,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Resolves a [`CiTargetKey`] to the [`CiBackendClient`] that serves it.
pub trait CiBackendResolver: Send + Sync {
    fn resolve(&self, target: &CiTargetKey) -> Option<std::sync::Arc<dyn CiBackendClient>>;
}

/// Deploys through a live CI backend: sets the pipeline config (retrying
/// once on the known save-race 500), then unpauses/exposes it per policy.
pub struct CiBackendDeployer {
    resolver: Box<dyn CiBackendResolver>,
    unpause_pipelines: bool,
    unpause_new_pipelines: bool,
    expose_pipelines: bool,
}

impl CiBackendDeployer {
    #[must_use]
    pub fn new(
        resolver: Box<dyn CiBackendResolver>,
        unpause_pipelines: bool,
        unpause_new_pipelines: bool,
        expose_pipelines: bool,
    ) -> Self {
        Self {
            resolver,
            unpause_pipelines,
            unpause_new_pipelines,
            expose_pipelines,
        }
    }
}

#[async_trait]
impl PipelineDeployer for CiBackendDeployer {
    async fn deploy(&self, pipeline: &Pipeline) -> DeployResult {
        let Some(client) = self.resolver.resolve(&pipeline.ci_target) else {
            warn!(pipeline = %pipeline.name, target = ?pipeline.ci_target, "no CI backend configured for target");
            return DeployResult {
                pipeline_name: pipeline.name.clone(),
                ci_target: pipeline.ci_target.clone(),
                status: DeployStatus::FAILED,
                error: Some(format!(
                    "no CI backend configured for {:?}/{:?}",
                    pipeline.ci_target.backend_name, pipeline.ci_target.team_name
                )),
            };
        };

        let body = match serde_yaml::to_string(&pipeline.rendered) {
            Ok(body) => body,
            Err(e) => {
                return DeployResult {
                    pipeline_name: pipeline.name.clone(),
                    ci_target: pipeline.ci_target.clone(),
                    status: DeployStatus::FAILED,
                    error: Some(e.to_string()),
                }
            }
        };

        match self.deploy_via(client.as_ref(), pipeline, &body).await {
            Ok(status) => DeployResult {
                pipeline_name: pipeline.name.clone(),
                ci_target: pipeline.ci_target.clone(),
                status,
                error: None,
            },
            Err(e) => {
                warn!(pipeline = %pipeline.name, error = %e, "pipeline deployment failed");
                DeployResult {
                    pipeline_name: pipeline.name.clone(),
                    ci_target: pipeline.ci_target.clone(),
                    status: DeployStatus::FAILED,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

impl CiBackendDeployer {
    async fn deploy_via(
        &self,
        client: &dyn CiBackendClient,
        pipeline: &Pipeline,
        body: &str,
    ) -> Result<DeployStatus, crate::error::CiBackendError> {
        let response = match client.set_pipeline(&pipeline.name, body).await {
            Ok(result) => result,
            Err(crate::error::CiBackendError::UnexpectedStatus { status, body: response_body, .. })
                if status == SAVE_RACE_CONFLICT_STATUS && response_body.contains(SAVE_RACE_CONFLICT_BODY) =>
            {
                let jitter_secs: u64 = rand::thread_rng().gen_range(5..30);
                warn!(
                    pipeline = %pipeline.name,
                    jitter_secs,
                    "set_pipeline hit a concurrent-save conflict, retrying after jitter"
                );
                tokio::time::sleep(Duration::from_secs(jitter_secs)).await;
                client.set_pipeline(&pipeline.name, body).await?
            }
            Err(e) => return Err(e),
        };

        info!(pipeline = %pipeline.name, target = ?pipeline.ci_target, "deployed pipeline");

        if self.unpause_pipelines {
            info!(pipeline = %pipeline.name, "unpausing pipeline");
            client.unpause_pipeline(&pipeline.name).await?;
        } else if self.unpause_new_pipelines && response == SetPipelineResult::Created {
            info!(pipeline = %pipeline.name, "unpausing newly created pipeline");
            client.unpause_pipeline(&pipeline.name).await?;
        }

        if self.expose_pipelines {
            client.expose_pipeline(&pipeline.name).await?;
        }

        let mut status = DeployStatus::SUCCEEDED;
        if response == SetPipelineResult::Created {
            status |= DeployStatus::CREATED;
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_config::CiTargetKey;

    fn ci_target() -> CiTargetKey {
        CiTargetKey {
            backend_name: "primary".into(),
            team_name: "main".into(),
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline {
            name: "org-repo-build".into(),
            ci_target: ci_target(),
            rendered: serde_json::json!({"jobs": []}),
        }
    }

    #[tokio::test]
    async fn noop_deployer_always_succeeds() {
        let result = NoOpDeployer.deploy(&pipeline()).await;
        assert!(result.ok());
    }

    #[tokio::test]
    async fn filesystem_deployer_writes_pipeline_file() {
        let dir = tempfile::tempdir().unwrap();
        let deployer = FilesystemDeployer::new(dir.path());
        let p = pipeline();
        let result = deployer.deploy(&p).await;
        assert!(result.ok());
        let written = std::fs::read_to_string(dir.path().join(&p.name)).unwrap();
        assert!(written.contains("jobs"));
    }
}
