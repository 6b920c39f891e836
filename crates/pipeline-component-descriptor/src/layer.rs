//! The layer abstraction the composite lookup walks: a plain
//! [`ComponentDescriptorLayer`] trait returning one of "found", "not found (with an
//! optional write-back)", or a hard error.

use async_trait::async_trait;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};

use crate::error::LookupError;

/// A one-shot callable that inserts a descriptor into a lower-priority cache layer.
/// Returned from a layer's [`ComponentDescriptorLayer::get`] on cache-miss so the
/// composite can populate that layer once the authoritative result is known.
#[async_trait]
pub trait WriteBack: Send + Sync {
    async fn write_back(
        &self,
        identity: &ComponentIdentity,
        descriptor: &ComponentDescriptor,
    ) -> Result<(), LookupError>;
}

/// Outcome of a single layer's lookup attempt.
pub enum LookupOutcome {
    Found(ComponentDescriptor),
    /// A miss; `Some(write_back)` if this layer can be populated once a later layer
    /// resolves the descriptor.
    NotFound(Option<Box<dyn WriteBack>>),
}

/// One link in the composite chain (in-memory, filesystem, delivery service, OCI
/// registry). The composite itself also implements this trait, so lookups can be
/// nested.
#[async_trait]
pub trait ComponentDescriptorLayer: Send + Sync {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError>;

    /// Human-readable layer name, used in log lines only.
    fn name(&self) -> &'static str;
}
