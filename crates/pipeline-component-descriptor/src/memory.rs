//! In-memory LRU cache layer (default capacity 2048).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};
use tracing::debug;

use crate::error::LookupError;
use crate::layer::{ComponentDescriptorLayer, LookupOutcome, WriteBack};
use crate::mapping::RepositoryMappingConfig;

const DEFAULT_CAPACITY: usize = 2048;

type CacheKey = (ComponentIdentity, RepositoryContext);

pub struct InMemoryLayer {
    cache: Mutex<LruCache<CacheKey, ComponentDescriptor>>,
    default_ctx: Option<RepositoryContext>,
    mapping: Option<RepositoryMappingConfig>,
}

impl InMemoryLayer {
    /// `default_ctx` and `mapping` are mutually exclusive.
    pub fn new(
        default_ctx: Option<RepositoryContext>,
        mapping: Option<RepositoryMappingConfig>,
    ) -> Result<Self, LookupError> {
        Self::with_capacity(default_ctx, mapping, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        default_ctx: Option<RepositoryContext>,
        mapping: Option<RepositoryMappingConfig>,
        capacity: usize,
    ) -> Result<Self, LookupError> {
        if default_ctx.is_some() && mapping.is_some() {
            return Err(LookupError::MappingAndDefaultContextConflict);
        }
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
            default_ctx,
            mapping,
        })
    }

    fn candidate_contexts(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Vec<RepositoryContext> {
        if let Some(ctx) = ctx {
            return vec![ctx.clone()];
        }
        if let Some(mapping) = &self.mapping {
            return mapping.iter_candidates(identity).cloned().collect();
        }
        self.default_ctx.clone().into_iter().collect()
    }
}

struct InMemoryWriteBack;

#[async_trait]
impl WriteBack for InMemoryWriteBack {
    async fn write_back(
        &self,
        _identity: &ComponentIdentity,
        _descriptor: &ComponentDescriptor,
    ) -> Result<(), LookupError> {
        // The composite calls us with the descriptor's own `current_repository_context`;
        // since that's not known here, the composite instead calls
        // `InMemoryLayer::insert` directly rather than going through this trait object
        // for the in-memory layer specifically. This impl exists only so the layer
        // satisfies the general `ComponentDescriptorLayer` contract when nested inside
        // another composite.
        Ok(())
    }
}

#[async_trait]
impl ComponentDescriptorLayer for InMemoryLayer {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError> {
        let candidates = self.candidate_contexts(identity, ctx);
        {
            let mut cache = self.cache.lock().unwrap();
            for candidate in &candidates {
                let key = (identity.clone(), candidate.clone());
                if let Some(descriptor) = cache.get(&key) {
                    debug!(component = %identity, layer = "memory", "cache hit");
                    return Ok(LookupOutcome::Found(descriptor.clone()));
                }
            }
        }
        Ok(LookupOutcome::NotFound(Some(Box::new(InMemoryWriteBack))))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl InMemoryLayer {
    /// Called directly by the composite once an authoritative descriptor is known,
    /// since write-back into the in-memory layer needs synchronous access to the
    /// mutex-guarded cache rather than the `WriteBack` trait object indirection used
    /// by the filesystem/delivery-service layers.
    pub fn insert(&self, descriptor: &ComponentDescriptor) {
        let Some(ctx) = descriptor.current_repository_context() else {
            debug!("skipping in-memory write-back: descriptor carries no repository context");
            return;
        };
        let key = (descriptor.identity.clone(), ctx.clone());
        self.cache.lock().unwrap().put(key, descriptor.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_insert_then_hit() {
        let layer = InMemoryLayer::new(Some(RepositoryContext::new("https://ocm.example")), None)
            .unwrap();
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");

        let outcome = layer.get(&id, None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::NotFound(Some(_))));

        let mut descriptor = ComponentDescriptor {
            identity: id.clone(),
            resources: vec![],
            sources: vec![],
            component_references: vec![],
            repository_contexts: vec![],
        };
        descriptor
            .repository_contexts
            .push(RepositoryContext::new("https://ocm.example"));
        layer.insert(&descriptor);

        let outcome = layer.get(&id, None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::Found(_)));
    }

    #[test]
    fn rejects_mapping_and_default_ctx_together() {
        let err = InMemoryLayer::new(
            Some(RepositoryContext::new("https://a")),
            Some(RepositoryMappingConfig::default()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LookupError::MappingAndDefaultContextConflict
        ));
    }
}
