//! CI-backend client trait and pipeline deployers: the narrow REST surface
//! and deploy strategies a replication run targets, generalized from a
//! Concourse-specific client into a backend-agnostic contract.

pub mod client;
pub mod deployer;
pub mod error;
pub mod model;

pub use client::{CiBackendClient, HttpCiBackendClient};
pub use deployer::{CiBackendDeployer, CiBackendResolver, FilesystemDeployer, NoOpDeployer, PipelineDeployer};
pub use error::CiBackendError;
pub use model::{
    GithubSource, JobConfig, PipelineConfig, PipelineConfigResource, ResourceType, ResourceVersion,
    SetPipelineResult,
};
