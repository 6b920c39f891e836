//! C5 `ReplicationOrchestrator`: parallel enumerate/render/deploy over a
//! bounded worker pool, duplicate-name detection, cleanup of orphaned
//! pipelines, resource bootstrapping, and owner notification.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::stream::{FuturesUnordered, StreamExt};
use pipeline_ci_backend::{CiBackendClient, CiBackendResolver, PipelineDeployer};
use pipeline_config::{
    CiTargetKey, DefinitionDescriptor, DeployResult, DeployStatus, JobMapping, PipelineCleanupPolicy,
    RenderOrigin, RenderResult, ReplicationResults,
};
use pipeline_notify::OwnerNotifier;
use pipeline_scm::{GithubClient, RepoSlug};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::renderer::PipelineRenderer;

/// Deliberately translated from `ThreadPoolExecutor(max_workers=16)` into
/// an async semaphore; see DESIGN.md.
pub const WORKER_POOL_WIDTH: usize = 16;

/// Pipeline names a cleanup pass should never delete even if not redeployed
/// this run (`remove_pipelines_filter`: returning `true` means keep).
pub trait RemovePipelinesFilter: Send + Sync {
    fn keep(&self, pipeline_name: &str) -> bool;
}

/// Default filter: nothing is protected beyond what was just deployed.
pub struct NoProtectedPipelines;

impl RemovePipelinesFilter for NoProtectedPipelines {
    fn keep(&self, _pipeline_name: &str) -> bool {
        false
    }
}

pub struct ReplicationOrchestrator {
    enumerators: Vec<Arc<dyn crate::enumerator::DefinitionEnumerator>>,
    renderer: Arc<dyn PipelineRenderer>,
    deployer: Arc<dyn PipelineDeployer>,
    resolver: Arc<dyn CiBackendResolver>,
    job_mappings: HashMap<String, JobMapping>,
    notifier: Arc<OwnerNotifier>,
    github: Arc<dyn GithubClient>,
    remove_pipelines_filter: Arc<dyn RemovePipelinesFilter>,
    reorder_pipelines: bool,
    worker_pool_width: usize,
}

impl ReplicationOrchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enumerators: Vec<Arc<dyn crate::enumerator::DefinitionEnumerator>>,
        renderer: Arc<dyn PipelineRenderer>,
        deployer: Arc<dyn PipelineDeployer>,
        resolver: Arc<dyn CiBackendResolver>,
        job_mappings: Vec<JobMapping>,
        notifier: Arc<OwnerNotifier>,
        github: Arc<dyn GithubClient>,
    ) -> Self {
        Self {
            enumerators,
            renderer,
            deployer,
            resolver,
            job_mappings: job_mappings.into_iter().map(|m| (m.name.clone(), m)).collect(),
            notifier,
            github,
            remove_pipelines_filter: Arc::new(NoProtectedPipelines),
            reorder_pipelines: false,
            worker_pool_width: WORKER_POOL_WIDTH,
        }
    }

    #[must_use]
    pub fn with_remove_pipelines_filter(mut self, filter: Arc<dyn RemovePipelinesFilter>) -> Self {
        self.remove_pipelines_filter = filter;
        self
    }

    #[must_use]
    pub fn with_reorder_pipelines(mut self, reorder: bool) -> Self {
        self.reorder_pipelines = reorder;
        self
    }

    /// Runs one full replication pass. Returns `true` iff every failed
    /// render was either notified successfully or required no notification,
    /// matching `replicate() -> bool`.
    pub async fn replicate(&self) -> bool {
        let descriptors = self.enumerate_all().await;
        let results = self.process_descriptors(descriptors, RenderOrigin::ScheduledReplication).await;

        let notify_ok = self.notify_failures(&results).await;

        if results.has_failures() {
            info!("replication run had failures, skipping cleanup");
        } else {
            self.cleanup(&results).await;
        }
        self.bootstrap_new_pipelines(&results).await;
        if self.reorder_pipelines {
            self.reorder(&results).await;
        }

        notify_ok
    }

    /// Re-replicates a single repository's definitions, used by the webhook
    /// dispatcher's push/create handlers. Does not run cleanup or reorder —
    /// those are whole-run concerns, not single-repository ones.
    pub async fn replicate_repository(
        &self,
        job_mapping_name: &str,
        origin: RenderOrigin,
    ) -> ReplicationResults {
        let descriptors: Vec<DefinitionDescriptor> = self
            .enumerate_all()
            .await
            .into_iter()
            .filter(|d| d.job_mapping_name == job_mapping_name)
            .collect();
        self.process_descriptors(descriptors, origin).await
    }

    async fn enumerate_all(&self) -> Vec<DefinitionDescriptor> {
        let mut all = Vec::new();
        for enumerator in &self.enumerators {
            all.extend(enumerator.enumerate().await);
        }
        all
    }

    async fn process_descriptors(
        &self,
        descriptors: Vec<DefinitionDescriptor>,
        origin: RenderOrigin,
    ) -> ReplicationResults {
        let semaphore = Arc::new(Semaphore::new(self.worker_pool_width));
        let accepted_names: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = FuturesUnordered::new();
        for descriptor in descriptors {
            let semaphore = Arc::clone(&semaphore);
            let accepted_names = Arc::clone(&accepted_names);
            let renderer = Arc::clone(&self.renderer);
            let deployer = Arc::clone(&self.deployer);
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                process_one(descriptor, origin, renderer.as_ref(), deployer.as_ref(), &accepted_names).await
            });
        }

        let mut results = ReplicationResults::default();
        while let Some(outcome) = tasks.next().await {
            match outcome {
                Ok(deploy) => results.by_target.entry(deploy.ci_target.clone()).or_default().push(deploy),
                Err(render_failure) => results.render_failures.push(render_failure),
            }
        }
        results
    }

    async fn notify_failures(&self, results: &ReplicationResults) -> bool {
        let mut all_ok = true;
        for failure in &results.render_failures {
            let RenderResult::Failure { descriptor, class, error } = failure else {
                continue;
            };
            if *class != pipeline_config::RenderFailureClass::UserError {
                info!(pipeline = %descriptor.pipeline_name, "render failure suppressed from notification (infrastructure class)");
                continue;
            }
            let repo = RepoSlug::new(descriptor.main_repo.owner.clone(), descriptor.main_repo.name.clone());
            let result = self
                .notifier
                .notify_render_failure_and_wait(
                    self.github.as_ref(),
                    &repo,
                    Some(descriptor.main_repo.branch.clone()).as_deref(),
                    &descriptor.committish,
                    &descriptor.effective_pipeline_name,
                    error,
                )
                .await;
            if let Err(e) = result {
                warn!(pipeline = %descriptor.pipeline_name, error = %e, "owner notification failed");
                all_ok = false;
            }
        }
        all_ok
    }

    async fn cleanup(&self, results: &ReplicationResults) {
        for (target, deploys) in &results.by_target {
            let Some(mapping) = self.job_mapping_for_target(target) else {
                continue;
            };
            if mapping.cleanup_policy != PipelineCleanupPolicy::RemoveOrphaned {
                continue;
            }
            let Some(client) = self.resolver.resolve(target) else {
                continue;
            };
            let deployed: HashSet<&str> = deploys.iter().map(|d| d.pipeline_name.as_str()).collect();
            let existing = match client.pipelines().await {
                Ok(names) => names,
                Err(e) => {
                    warn!(target = ?target, error = %e, "failed to list pipelines for cleanup");
                    continue;
                }
            };
            for name in existing {
                if deployed.contains(name.as_str()) || self.remove_pipelines_filter.keep(&name) {
                    continue;
                }
                info!(pipeline = %name, target = ?target, "deleting orphaned pipeline");
                if let Err(e) = client.delete_pipeline(&name).await {
                    warn!(pipeline = %name, error = %e, "failed to delete orphaned pipeline");
                }
            }
        }
    }

    async fn bootstrap_new_pipelines(&self, results: &ReplicationResults) {
        for (target, deploys) in &results.by_target {
            let Some(client) = self.resolver.resolve(target) else {
                continue;
            };
            for deploy in deploys {
                if !deploy.status.contains(DeployStatus::CREATED) {
                    continue;
                }
                let resources = match client
                    .pipeline_resources(std::slice::from_ref(&deploy.pipeline_name), None)
                    .await
                {
                    Ok(resources) => resources,
                    Err(e) => {
                        warn!(pipeline = %deploy.pipeline_name, error = %e, "failed to list resources for bootstrap");
                        continue;
                    }
                };
                for resource in resources {
                    if let Err(e) = client.trigger_resource_check(&deploy.pipeline_name, &resource.name).await {
                        warn!(pipeline = %deploy.pipeline_name, resource = %resource.name, error = %e, "failed to trigger initial resource check");
                    }
                }
            }
        }
    }

    async fn reorder(&self, results: &ReplicationResults) {
        for (target, deploys) in &results.by_target {
            let Some(client) = self.resolver.resolve(target) else {
                continue;
            };
            let mut names: Vec<String> = deploys.iter().map(|d| d.pipeline_name.clone()).collect();
            names.sort();
            if let Err(e) = client.order_pipelines(&names).await {
                warn!(target = ?target, error = %e, "failed to reorder pipelines");
            }
        }
    }

    fn job_mapping_for_target(&self, target: &CiTargetKey) -> Option<&JobMapping> {
        self.job_mappings
            .values()
            .find(|m| m.ci_target.backend_name == target.backend_name && m.ci_target.team_name == target.team_name)
    }
}

/// The per-descriptor chain: short-circuit on enumeration error, else
/// render → duplicate-check → deploy. `Ok` carries a deploy result (possibly
/// SKIPPED), `Err` carries a render failure — this split is what lets the
/// caller route outcomes into `ReplicationResults`' two buckets.
async fn process_one(
    descriptor: DefinitionDescriptor,
    origin: RenderOrigin,
    renderer: &dyn PipelineRenderer,
    deployer: &dyn PipelineDeployer,
    accepted_names: &Mutex<HashSet<String>>,
) -> Result<DeployResult, RenderResult> {
    if let Some(error) = &descriptor.enumeration_error {
        return Ok(skipped(&descriptor, error.clone()));
    }

    let render_result = renderer.render(&descriptor, origin).await;
    let pipeline = match render_result {
        RenderResult::Success { pipeline, .. } => pipeline,
        failure @ RenderResult::Failure { .. } => return Err(failure),
    };

    {
        let mut names = accepted_names.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !names.insert(pipeline.name.clone()) {
            return Ok(DeployResult {
                pipeline_name: pipeline.name.clone(),
                ci_target: pipeline.ci_target.clone(),
                status: DeployStatus::SKIPPED,
                error: Some(format!("duplicate pipeline name: {}", pipeline.name)),
            });
        }
    }

    Ok(deployer.deploy(&pipeline).await)
}

fn skipped(descriptor: &DefinitionDescriptor, error: String) -> DeployResult {
    DeployResult {
        pipeline_name: descriptor.effective_pipeline_name.clone(),
        ci_target: descriptor.ci_target.clone(),
        status: DeployStatus::SKIPPED,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::DefinitionEnumerator;
    use async_trait::async_trait;
    use pipeline_config::MainRepository;

    struct FixedEnumerator(Vec<DefinitionDescriptor>);

    #[async_trait]
    impl DefinitionEnumerator for FixedEnumerator {
        async fn enumerate(&self) -> Vec<DefinitionDescriptor> {
            self.0.clone()
        }
    }

    struct AlwaysSucceedRenderer;

    #[async_trait]
    impl PipelineRenderer for AlwaysSucceedRenderer {
        async fn render(&self, descriptor: &DefinitionDescriptor, _origin: RenderOrigin) -> RenderResult {
            RenderResult::Success {
                descriptor: descriptor.clone(),
                pipeline: pipeline_config::Pipeline {
                    name: descriptor.effective_pipeline_name.clone(),
                    ci_target: descriptor.ci_target.clone(),
                    rendered: serde_json::json!({}),
                },
            }
        }
    }

    fn descriptor(name: &str) -> DefinitionDescriptor {
        DefinitionDescriptor {
            pipeline_name: name.into(),
            effective_pipeline_name: name.into(),
            main_repo: MainRepository {
                owner: "org".into(),
                name: "repo".into(),
                branch: "main".into(),
                hostname: "github.example".into(),
            },
            base_definition: serde_json::Value::Null,
            override_definitions: vec![],
            ci_target: CiTargetKey {
                backend_name: "main".into(),
                team_name: "team-a".into(),
            },
            job_mapping_name: "org/repo".into(),
            secret_cfg_name: None,
            committish: "deadbeef".into(),
            enumeration_error: None,
        }
    }

    #[tokio::test]
    async fn duplicate_pipeline_name_is_skipped_with_diagnostic() {
        let accepted = Mutex::new(HashSet::new());
        let renderer = AlwaysSucceedRenderer;
        let deployer = pipeline_ci_backend::NoOpDeployer;
        let first = process_one(descriptor("foo"), RenderOrigin::LocalInvocation, &renderer, &deployer, &accepted)
            .await
            .unwrap();
        assert!(first.ok());
        let second = process_one(descriptor("foo"), RenderOrigin::LocalInvocation, &renderer, &deployer, &accepted)
            .await
            .unwrap();
        assert!(second.status.contains(DeployStatus::SKIPPED));
        assert_eq!(second.error.as_deref(), Some("duplicate pipeline name: foo"));
    }

    #[tokio::test]
    async fn enumeration_error_short_circuits_to_skipped() {
        let accepted = Mutex::new(HashSet::new());
        let renderer = AlwaysSucceedRenderer;
        let deployer = pipeline_ci_backend::NoOpDeployer;
        let mut d = descriptor("bar");
        d.enumeration_error = Some("template missing".into());
        let result = process_one(d, RenderOrigin::LocalInvocation, &renderer, &deployer, &accepted)
            .await
            .unwrap();
        assert!(result.status.contains(DeployStatus::SKIPPED));
        assert_eq!(result.error.as_deref(), Some("template missing"));
    }
}
