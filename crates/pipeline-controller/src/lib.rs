//! Pipeline rendering, replication orchestration, and webhook dispatch for
//! `pipeline-sync`.
//!
//! - [`template`] / [`renderer`]: merge `.ci/pipeline_definitions` entries
//!   through Handlebars templates into a renderable [`pipeline_config::Pipeline`].
//! - [`enumerator`]: reads `.ci/pipeline_definitions` from configured
//!   repositories.
//! - [`orchestrator`]: drives a full enumerate/render/deploy/cleanup pass
//!   across a bounded worker pool.
//! - [`dispatcher`]: the axum-based GitHub webhook endpoint that triggers
//!   single-repository replication, build aborts, and PR resource updates.

pub mod dispatcher;
pub mod enumerator;
pub mod error;
pub mod orchestrator;
pub mod renderer;
pub mod template;

pub use dispatcher::WebhookDispatcher;
pub use enumerator::{DefinitionEnumerator, GithubDefinitionEnumerator};
pub use error::{DispatchError, OrchestratorError, TemplateError};
pub use orchestrator::{NoProtectedPipelines, RemovePipelinesFilter, ReplicationOrchestrator};
pub use renderer::{HandlebarsPipelineRenderer, PipelineRenderer};
pub use template::TemplateRegistry;
