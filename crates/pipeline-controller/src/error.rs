use thiserror::Error;

/// Errors raised while compiling or rendering a Handlebars template. Never
/// surfaced directly to a caller of [`crate::renderer::PipelineRenderer`] —
/// the renderer catches these and folds them into a `RenderResult::Failure`
/// with the engine's own formatted error, never a raw Rust panic message.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0:?}")]
    NotFound(String),

    #[error("failed to compile template: {0}")]
    Compile(#[source] Box<handlebars::TemplateError>),

    #[error("failed to render template: {0}")]
    Render(#[source] Box<handlebars::RenderError>),

    #[error("io error loading template: {0}")]
    Io(#[source] std::io::Error),

    #[error("pipeline variant {0:?} does not declare a main repository")]
    MissingMainRepository(String),
}

/// Errors the webhook dispatcher's own plumbing can raise. Per-event handler
/// errors are deliberately *not* part of this enum: §5/§7 require every
/// handler error to be caught and logged inside its own detached task, never
/// propagated to the HTTP layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing required header {0}")]
    MissingHeader(&'static str),

    #[error("unrecognized event type {0:?}")]
    UnknownEventKind(String),

    #[error("failed to parse event body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no job mapping configured for repository {0:?}")]
    NoJobMapping(String),
}

/// Errors surfaced while orchestrating a replication run itself (as opposed
/// to a single descriptor's render/deploy, which never raises — failures
/// there are captured into [`pipeline_config::RenderResult`] /
/// [`pipeline_config::DeployResult`]).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("definition enumeration failed: {0}")]
    Enumeration(String),

    #[error(transparent)]
    CiBackend(#[from] pipeline_ci_backend::CiBackendError),
}
