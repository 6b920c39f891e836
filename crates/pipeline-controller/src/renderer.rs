//! C3 `PipelineRenderer`: merges a [`DefinitionDescriptor`]'s base and
//! override definitions, builds the pipeline-metadata bundle, and renders it
//! through a [`TemplateRegistry`]. Never panics or returns `Result` to its
//! caller — every failure mode is captured into [`RenderResult::Failure`],
//! matching `concourse.replicator.Renderer.render`.

use async_trait::async_trait;
use pipeline_config::{CiTargetKey, DefinitionDescriptor, Pipeline, RenderFailureClass, RenderOrigin, RenderResult};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::TemplateError;
use crate::template::{merge_all, TemplateRegistry};

/// Tooling version stamped into every rendered pipeline's metadata bundle.
pub const TOOLING_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The pipeline-metadata bundle handed to the template as `pipeline`,
/// alongside the merged definition tree itself (`definition`).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetadata {
    pub pipeline_name: String,
    pub target_team: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_cfg: Option<String>,
    pub job_mapping: String,
    pub render_origin: RenderOrigin,
    pub tooling_version: &'static str,
    pub committish: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_pipeline_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

#[async_trait]
pub trait PipelineRenderer: Send + Sync {
    async fn render(&self, descriptor: &DefinitionDescriptor, origin: RenderOrigin) -> RenderResult;
}

/// Default template name read from the merged definition tree's `template`
/// key when a descriptor doesn't declare one.
const DEFAULT_TEMPLATE_NAME: &str = "pipeline";

/// Handlebars-backed renderer. `background_image` and
/// `replication_pipeline_name` are resolved from the merged definition tree
/// (`background_image`, `replication_pipeline_name` keys) since neither is
/// carried on [`DefinitionDescriptor`] itself — they're template-variant
/// concerns, not enumeration concerns.
pub struct HandlebarsPipelineRenderer {
    registry: TemplateRegistry,
}

impl HandlebarsPipelineRenderer {
    #[must_use]
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    fn template_name(merged: &Value) -> String {
        merged
            .get("template")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TEMPLATE_NAME)
            .to_string()
    }

    fn render_context(
        descriptor: &DefinitionDescriptor,
        merged: &Value,
        origin: RenderOrigin,
    ) -> Value {
        let metadata = PipelineMetadata {
            pipeline_name: descriptor.effective_pipeline_name.clone(),
            target_team: descriptor.ci_target.team_name.clone(),
            secret_cfg: descriptor.secret_cfg_name.clone(),
            job_mapping: descriptor.job_mapping_name.clone(),
            render_origin: origin,
            tooling_version: TOOLING_VERSION,
            committish: descriptor.committish.clone(),
            replication_pipeline_name: merged
                .get("replication_pipeline_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            background_image: merged
                .get("background_image")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        serde_json::json!({
            "definition": merged,
            "pipeline": metadata,
        })
    }
}

#[async_trait]
impl PipelineRenderer for HandlebarsPipelineRenderer {
    async fn render(&self, descriptor: &DefinitionDescriptor, origin: RenderOrigin) -> RenderResult {
        if descriptor.main_repo.owner.is_empty() || descriptor.main_repo.name.is_empty() {
            return failure(
                descriptor,
                RenderFailureClass::UserError,
                format!(
                    "pipeline variant {:?} does not declare a main repository",
                    descriptor.pipeline_name
                ),
            );
        }

        let merged = merge_all(&descriptor.base_definition, &descriptor.override_definitions);
        let template_name = Self::template_name(&merged);

        if !self.registry.has_template(&template_name) {
            return failure(
                descriptor,
                RenderFailureClass::UserError,
                format!("template {template_name:?} not found"),
            );
        }

        let context = Self::render_context(descriptor, &merged, origin);

        match self.registry.render(&template_name, &context) {
            Ok(rendered_text) => {
                let rendered: Value = match parse_rendered(&rendered_text) {
                    Ok(v) => v,
                    Err(e) => return failure(descriptor, RenderFailureClass::UserError, e),
                };
                RenderResult::Success {
                    descriptor: descriptor.clone(),
                    pipeline: Pipeline {
                        name: descriptor.effective_pipeline_name.clone(),
                        ci_target: descriptor.ci_target.clone(),
                        rendered,
                    },
                }
            }
            Err(e) => {
                let class = classify_template_error(&e);
                warn!(pipeline = %descriptor.pipeline_name, error = %e, "template render failed");
                failure(descriptor, class, e.to_string())
            }
        }
    }
}

fn failure(descriptor: &DefinitionDescriptor, class: RenderFailureClass, error: String) -> RenderResult {
    RenderResult::Failure {
        descriptor: descriptor.clone(),
        class,
        error,
    }
}

/// The renderer's template output is YAML (a Concourse pipeline config is
/// YAML on the wire); parsing it back into a `Value` here lets the deployer
/// re-serialize deterministically and lets tests assert on structure rather
/// than text.
fn parse_rendered(text: &str) -> Result<Value, String> {
    serde_yaml::from_str(text).map_err(|e| format!("rendered template is not valid YAML: {e}"))
}

/// Translates a template failure into the notification-suppression class:
/// a missing include/partial or a Handlebars engine-internal error indicates
/// our own infrastructure, not the repository owner's pipeline definition.
fn classify_template_error(error: &TemplateError) -> RenderFailureClass {
    match error {
        TemplateError::Io(_) | TemplateError::NotFound(_) => RenderFailureClass::Infrastructure,
        TemplateError::Compile(_) | TemplateError::Render(_) | TemplateError::MissingMainRepository(_) => {
            RenderFailureClass::UserError
        }
    }
}
