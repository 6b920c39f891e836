//! Shared data model and configuration types for `pipeline-sync`.
//!
//! This crate has no I/O of its own; it defines the vocabulary that every
//! other crate in the workspace builds on.

pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;

pub use component::{ComponentDescriptor, ComponentIdentity, RepositoryContext, UpgradeVector};
pub use config::{
    CiBackendConfig, ComponentDescriptorConfig, DeployConfig, EmailConfig, RootConfig,
    WebhookDispatcherConfig,
};
pub use error::ConfigError;
pub use event::{
    CreateEvent, Event, PullRequestAction, PullRequestEvent, PushEvent, RefType, RepositoryRef,
    PIPELINE_DEFINITIONS_PATH,
};
pub use pipeline::{
    AbortConfig, AbortObsoleteJobs, Build, BuildStatus, CiTargetKey, DefinitionDescriptor,
    DeployResult, DeployStatus, JobMapping, MainRepository, Pipeline, PipelineCleanupPolicy,
    RenderFailureClass, RenderOrigin, RenderResult, ReplicationResults,
};
