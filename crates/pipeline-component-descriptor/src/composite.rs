//! Composite lookup: walks configured layers in priority order and, on a
//! downstream hit, replays write-backs into every layer that missed. The
//! composite is itself a [`ComponentDescriptorLayer`], so it can be nested —
//! callers always pass it explicitly rather than reaching for a global.

use async_trait::async_trait;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::layer::{ComponentDescriptorLayer, LookupOutcome, WriteBack};
use crate::memory::InMemoryLayer;

/// Ordered chain of lookup layers plus an optional in-memory cache that is
/// special-cased because its write-back needs direct, synchronous access to
/// the descriptor being inserted (see [`InMemoryLayer::insert`]).
pub struct CompositeLookup {
    memory: Option<std::sync::Arc<InMemoryLayer>>,
    layers: Vec<Box<dyn ComponentDescriptorLayer>>,
}

impl CompositeLookup {
    #[must_use]
    pub fn new(
        memory: Option<std::sync::Arc<InMemoryLayer>>,
        layers: Vec<Box<dyn ComponentDescriptorLayer>>,
    ) -> Self {
        Self { memory, layers }
    }

    pub async fn lookup(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<ComponentDescriptor, LookupError> {
        if let Some(memory) = &self.memory {
            if let LookupOutcome::Found(descriptor) = memory.get(identity, ctx).await? {
                debug!(component = %identity, "resolved from in-memory layer");
                return Ok(descriptor);
            }
        }

        let mut pending_write_backs: Vec<Box<dyn WriteBack>> = Vec::new();

        for layer in &self.layers {
            match layer.get(identity, ctx).await {
                Ok(LookupOutcome::Found(descriptor)) => {
                    debug!(component = %identity, layer = layer.name(), "resolved");
                    self.replay_write_backs(identity, &descriptor, pending_write_backs)
                        .await;
                    if let Some(memory) = &self.memory {
                        memory.insert(&descriptor);
                    }
                    return Ok(descriptor);
                }
                Ok(LookupOutcome::NotFound(write_back)) => {
                    if let Some(write_back) = write_back {
                        pending_write_backs.push(write_back);
                    }
                }
                Err(e) => {
                    warn!(component = %identity, layer = layer.name(), error = %e, "layer lookup failed, continuing to next layer");
                }
            }
        }

        Err(LookupError::NotFound(identity.to_string()))
    }

    async fn replay_write_backs(
        &self,
        identity: &ComponentIdentity,
        descriptor: &ComponentDescriptor,
        write_backs: Vec<Box<dyn WriteBack>>,
    ) {
        for write_back in write_backs {
            if let Err(e) = write_back.write_back(identity, descriptor).await {
                warn!(component = %identity, error = %e, "write-back to a missed layer failed");
            }
        }
    }
}

#[async_trait]
impl ComponentDescriptorLayer for CompositeLookup {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError> {
        match self.lookup(identity, ctx).await {
            Ok(descriptor) => Ok(LookupOutcome::Found(descriptor)),
            Err(LookupError::NotFound(_)) => Ok(LookupOutcome::NotFound(None)),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_config::RepositoryContext;
    use std::sync::Arc;

    struct FixedLayer {
        name: &'static str,
        descriptor: Option<ComponentDescriptor>,
    }

    #[async_trait]
    impl ComponentDescriptorLayer for FixedLayer {
        async fn get(
            &self,
            _identity: &ComponentIdentity,
            _ctx: Option<&RepositoryContext>,
        ) -> Result<LookupOutcome, LookupError> {
            match &self.descriptor {
                Some(d) => Ok(LookupOutcome::Found(d.clone())),
                None => Ok(LookupOutcome::NotFound(None)),
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[tokio::test]
    async fn falls_through_to_second_layer_and_populates_memory() {
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");
        let descriptor = ComponentDescriptor {
            identity: id.clone(),
            resources: vec![],
            sources: vec![],
            component_references: vec![],
            repository_contexts: vec![RepositoryContext::new("https://ocm.example")],
        };

        let memory = Arc::new(
            InMemoryLayer::new(Some(RepositoryContext::new("https://ocm.example")), None).unwrap(),
        );
        let composite = CompositeLookup::new(
            Some(memory.clone()),
            vec![
                Box::new(FixedLayer {
                    name: "miss",
                    descriptor: None,
                }),
                Box::new(FixedLayer {
                    name: "hit",
                    descriptor: Some(descriptor.clone()),
                }),
            ],
        );

        let resolved = composite
            .lookup(&id, Some(&RepositoryContext::new("https://ocm.example")))
            .await
            .unwrap();
        assert_eq!(resolved.identity, id);

        let memory_outcome = memory
            .get(&id, Some(&RepositoryContext::new("https://ocm.example")))
            .await
            .unwrap();
        assert!(matches!(memory_outcome, LookupOutcome::Found(_)));
    }

    #[tokio::test]
    async fn returns_not_found_error_when_every_layer_misses() {
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");
        let composite = CompositeLookup::new(
            None,
            vec![Box::new(FixedLayer {
                name: "miss",
                descriptor: None,
            })],
        );
        let err = composite.lookup(&id, None).await.unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
    }
}
