//! Aborts in-flight builds left over from before a force-push, mirroring
//! `whd/dispatcher.py::abort_running_jobs_if_configured`.

use pipeline_ci_backend::CiBackendClient;
use pipeline_config::{AbortObsoleteJobs, JobMapping};
use tracing::{info, warn};

/// Aborts every running build of every job on `pipeline_name` whose plan
/// references `previous_ref`, for jobs whose effective
/// [`AbortObsoleteJobs`] policy applies to this push. A job's own
/// `abort_obsolete_jobs` override (if set) wins over the job mapping's
/// configured default. Returns the number of builds aborted.
pub async fn abort_obsolete_jobs(
    client: &dyn CiBackendClient,
    mapping: &JobMapping,
    pipeline_name: &str,
    previous_ref: &str,
    is_forced_push: bool,
) -> usize {
    let cfg = match client.pipeline_cfg(pipeline_name).await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(pipeline = pipeline_name, error = %e, "failed to fetch pipeline config for abort check");
            return 0;
        }
    };

    let mut aborted = 0;
    for job in &cfg.jobs {
        let policy = job.abort_obsolete_jobs.unwrap_or(mapping.abort_config.policy);
        let applies = match policy {
            AbortObsoleteJobs::Never => false,
            AbortObsoleteJobs::OnForcePushOnly => is_forced_push,
            AbortObsoleteJobs::Always => true,
        };
        if !applies {
            continue;
        }

        let builds = match client.job_builds(pipeline_name, &job.name).await {
            Ok(builds) => builds,
            Err(e) => {
                warn!(pipeline = pipeline_name, job = %job.name, error = %e, "failed to list builds for abort check");
                continue;
            }
        };

        let recent = builds
            .into_iter()
            .take(mapping.abort_config.builds_to_consider as usize);

        for build in recent {
            if !build.is_active() || !build.contains_version_ref(previous_ref) {
                continue;
            }
            match client.abort_build(&build.id).await {
                Ok(()) => {
                    info!(pipeline = pipeline_name, job = %job.name, build = %build.id, "aborted obsolete build");
                    aborted += 1;
                }
                Err(e) => {
                    warn!(pipeline = pipeline_name, job = %job.name, build = %build.id, error = %e, "failed to abort obsolete build");
                }
            }
        }
    }
    aborted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_ci_backend::{CiBackendError, JobConfig, PipelineConfig, PipelineConfigResource, ResourceType, ResourceVersion, SetPipelineResult};
    use pipeline_config::{Build, BuildStatus, CiTargetKey, PipelineCleanupPolicy};
    use std::sync::Mutex;

    struct FakeClient {
        cfg: PipelineConfig,
        builds: Vec<Build>,
        aborted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CiBackendClient for FakeClient {
        async fn set_pipeline(&self, _name: &str, _body: &str) -> Result<SetPipelineResult, CiBackendError> {
            unimplemented!()
        }
        async fn unpause_pipeline(&self, _name: &str) -> Result<(), CiBackendError> {
            unimplemented!()
        }
        async fn expose_pipeline(&self, _name: &str) -> Result<(), CiBackendError> {
            unimplemented!()
        }
        async fn pipelines(&self) -> Result<Vec<String>, CiBackendError> {
            unimplemented!()
        }
        async fn delete_pipeline(&self, _name: &str) -> Result<(), CiBackendError> {
            unimplemented!()
        }
        async fn pipeline_resources(
            &self,
            _pipeline_names: &[String],
            _resource_type: Option<ResourceType>,
        ) -> Result<Vec<PipelineConfigResource>, CiBackendError> {
            unimplemented!()
        }
        async fn trigger_resource_check(&self, _pipeline: &str, _resource: &str) -> Result<(), CiBackendError> {
            unimplemented!()
        }
        async fn order_pipelines(&self, _names: &[String]) -> Result<(), CiBackendError> {
            unimplemented!()
        }
        async fn pipeline_cfg(&self, _name: &str) -> Result<PipelineConfig, CiBackendError> {
            Ok(self.cfg.clone())
        }
        async fn job_builds(&self, _pipeline: &str, _job: &str) -> Result<Vec<Build>, CiBackendError> {
            Ok(self.builds.clone())
        }
        async fn abort_build(&self, build_id: &str) -> Result<(), CiBackendError> {
            self.aborted.lock().unwrap().push(build_id.to_string());
            Ok(())
        }
        async fn resource_versions(&self, _pipeline: &str, _resource: &str) -> Result<Vec<ResourceVersion>, CiBackendError> {
            unimplemented!()
        }
    }

    fn mapping(policy: AbortObsoleteJobs) -> JobMapping {
        JobMapping {
            name: "org/repo".into(),
            ci_target: CiTargetKey {
                backend_name: "main".into(),
                team_name: "team-a".into(),
            },
            trusted_teams: vec![],
            deny_on_empty_trusted_teams: false,
            cleanup_policy: PipelineCleanupPolicy::RemoveOrphaned,
            abort_config: pipeline_config::AbortConfig {
                builds_to_consider: 5,
                policy,
            },
        }
    }

    fn build(id: &str, status: BuildStatus, version_refs: &[&str]) -> Build {
        Build {
            id: id.into(),
            job_name: "build".into(),
            ref_: "refs/heads/main".into(),
            status,
            version_refs: version_refs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn aborts_only_running_builds_referencing_previous_ref() {
        let client = FakeClient {
            cfg: PipelineConfig {
                resources: vec![],
                jobs: vec![JobConfig {
                    name: "build".into(),
                    abort_obsolete_jobs: None,
                }],
            },
            builds: vec![
                build("1", BuildStatus::Running, &["abc"]),
                build("2", BuildStatus::Running, &["xyz"]),
                build("3", BuildStatus::Succeeded, &["abc"]),
            ],
            aborted: Mutex::new(vec![]),
        };
        let mapping = mapping(AbortObsoleteJobs::Always);
        let count = abort_obsolete_jobs(&client, &mapping, "p", "abc", false).await;
        assert_eq!(count, 1);
        assert_eq!(*client.aborted.lock().unwrap(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn on_force_push_only_policy_skips_non_forced_pushes() {
        let client = FakeClient {
            cfg: PipelineConfig {
                resources: vec![],
                jobs: vec![JobConfig {
                    name: "build".into(),
                    abort_obsolete_jobs: None,
                }],
            },
            builds: vec![build("1", BuildStatus::Running, &["abc"])],
            aborted: Mutex::new(vec![]),
        };
        let mapping = mapping(AbortObsoleteJobs::OnForcePushOnly);
        let count = abort_obsolete_jobs(&client, &mapping, "p", "abc", false).await;
        assert_eq!(count, 0);
        let count = abort_obsolete_jobs(&client, &mapping, "p", "abc", true).await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn job_level_override_wins_over_mapping_default() {
        let client = FakeClient {
            cfg: PipelineConfig {
                resources: vec![],
                jobs: vec![JobConfig {
                    name: "build".into(),
                    abort_obsolete_jobs: Some(AbortObsoleteJobs::Never),
                }],
            },
            builds: vec![build("1", BuildStatus::Running, &["abc"])],
            aborted: Mutex::new(vec![]),
        };
        let mapping = mapping(AbortObsoleteJobs::Always);
        let count = abort_obsolete_jobs(&client, &mapping, "p", "abc", false).await;
        assert_eq!(count, 0);
    }
}
