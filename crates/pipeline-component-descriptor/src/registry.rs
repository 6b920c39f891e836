//! OCI registry layer: component descriptors are stored as OCM does, at
//! `<repo>/component-descriptors/<name>:<version>`, either as a dedicated
//! layer blob (preferred) or, for older publishers, as the manifest's config
//! blob.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};
use pipeline_oci::{Descriptor, ImageManifest, Manifest, OciClient, OciImageReference};
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::layer::{ComponentDescriptorLayer, LookupOutcome, WriteBack};
use crate::mapping::RepositoryMappingConfig;

/// Custom media type OCM publishers attach component-descriptor YAML layers
/// with. A registry that predates this convention stores the descriptor as
/// the manifest's config blob instead; this layer falls back to that when no
/// matching layer is present.
pub const MEDIA_TYPE_COMPONENT_DESCRIPTOR: &str =
    "application/vnd.gardener.cloud.cnudie.component-descriptor.v2+yaml";

pub struct OciRegistryLayer {
    client: Arc<dyn OciClient>,
    default_ctx: Option<RepositoryContext>,
    mapping: Option<RepositoryMappingConfig>,
}

impl OciRegistryLayer {
    pub fn new(
        client: Arc<dyn OciClient>,
        default_ctx: Option<RepositoryContext>,
        mapping: Option<RepositoryMappingConfig>,
    ) -> Result<Self, LookupError> {
        if default_ctx.is_some() && mapping.is_some() {
            return Err(LookupError::MappingAndDefaultContextConflict);
        }
        Ok(Self {
            client,
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

    fn oci_reference(
        &self,
        identity: &ComponentIdentity,
        ctx: &RepositoryContext,
    ) -> Result<OciImageReference, LookupError> {
        let raw = ctx.component_descriptor_oci_ref(identity);
        let without_scheme = raw
            .strip_prefix("https://")
            .or_else(|| raw.strip_prefix("http://"))
            .unwrap_or(&raw);
        OciImageReference::parse(without_scheme).map_err(LookupError::from)
    }

    async fn fetch(
        &self,
        reference: &OciImageReference,
    ) -> Result<Option<ComponentDescriptor>, LookupError> {
        let manifest = match self.client.manifest(reference, None).await {
            Ok(m) => m,
            Err(pipeline_oci::OciError::UnexpectedStatus { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Manifest::V2(manifest) = manifest else {
            warn!(%reference, "component-descriptor manifest is not schema-2, cannot extract YAML");
            return Ok(None);
        };

        let yaml_bytes = match descriptor_layer(&manifest) {
            Some(layer) => self.client.blob(reference, &layer.digest).await?,
            None => {
                warn!(
                    %reference,
                    "no dedicated component-descriptor layer found, falling back to config blob"
                );
                self.client.blob(reference, &manifest.config.digest).await?
            }
        };
        let yaml = String::from_utf8_lossy(&yaml_bytes);
        Ok(Some(ComponentDescriptor::from_yaml(&yaml)?))
    }
}

/// Prefers a layer tagged with [`MEDIA_TYPE_COMPONENT_DESCRIPTOR`]; falls
/// back to the first layer present if the registry used a generic media type.
fn descriptor_layer(manifest: &ImageManifest) -> Option<&Descriptor> {
    manifest
        .layers
        .iter()
        .find(|l| l.media_type == MEDIA_TYPE_COMPONENT_DESCRIPTOR)
        .or_else(|| manifest.layers.first())
}

struct OciWriteBack {
    client: Arc<dyn OciClient>,
    reference: OciImageReference,
}

#[async_trait]
impl WriteBack for OciWriteBack {
    async fn write_back(
        &self,
        _identity: &ComponentIdentity,
        descriptor: &ComponentDescriptor,
    ) -> Result<(), LookupError> {
        let yaml = descriptor.to_yaml()?;
        let yaml_bytes = yaml.into_bytes();
        let digest = format!("sha256:{}", sha256_hex(&yaml_bytes));
        self.client
            .put_blob(&self.reference, &digest, yaml_bytes.clone().into())
            .await
            .map_err(LookupError::from)?;

        let cfg_bytes = b"{}".to_vec();
        let cfg_digest = format!("sha256:{}", sha256_hex(&cfg_bytes));
        self.client
            .put_blob(&self.reference, &cfg_digest, cfg_bytes.clone().into())
            .await
            .map_err(LookupError::from)?;

        let manifest = ImageManifest {
            schema_version: 2,
            media_type: pipeline_oci::manifest::MEDIA_TYPE_MANIFEST_V2.to_string(),
            config: Descriptor {
                media_type: pipeline_oci::manifest::MEDIA_TYPE_CONFIG.to_string(),
                size: cfg_bytes.len() as u64,
                digest: cfg_digest,
                platform: None,
                annotations: None,
            },
            layers: vec![Descriptor {
                media_type: MEDIA_TYPE_COMPONENT_DESCRIPTOR.to_string(),
                size: yaml_bytes.len() as u64,
                digest,
                platform: None,
                annotations: None,
            }],
            annotations: None,
        };
        let body = serde_json::to_vec(&manifest)?;
        self.client
            .put_manifest(&self.reference, &manifest.media_type, &body)
            .await
            .map_err(LookupError::from)?;
        debug!(reference = %self.reference, "wrote component descriptor back to OCI registry");
        Ok(())
    }
}

#[async_trait]
impl ComponentDescriptorLayer for OciRegistryLayer {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError> {
        let candidates = self.candidate_contexts(identity, ctx);
        if candidates.is_empty() {
            return Err(LookupError::NoMatchingRepositoryMapping(identity.to_string()));
        }

        for candidate in &candidates {
            let reference = self.oci_reference(identity, candidate)?;
            if let Some(descriptor) = self.fetch(&reference).await? {
                debug!(component = %identity, %reference, "OCI registry cache hit");
                return Ok(LookupOutcome::Found(descriptor));
            }
        }

        let reference = self.oci_reference(identity, &candidates[0])?;
        Ok(LookupOutcome::NotFound(Some(Box::new(OciWriteBack {
            client: self.client.clone(),
            reference,
        }))))
    }

    fn name(&self) -> &'static str {
        "oci-registry"
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_tagged_descriptor_layer_over_generic_ones() {
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: "application/vnd.docker.distribution.manifest.v2+json".to_string(),
            config: Descriptor {
                media_type: "application/vnd.docker.container.image.v1+json".to_string(),
                size: 2,
                digest: "sha256:cfg".to_string(),
                platform: None,
                annotations: None,
            },
            layers: vec![
                Descriptor {
                    media_type: "application/octet-stream".to_string(),
                    size: 1,
                    digest: "sha256:generic".to_string(),
                    platform: None,
                    annotations: None,
                },
                Descriptor {
                    media_type: MEDIA_TYPE_COMPONENT_DESCRIPTOR.to_string(),
                    size: 1,
                    digest: "sha256:tagged".to_string(),
                    platform: None,
                    annotations: None,
                },
            ],
            annotations: None,
        };
        let chosen = descriptor_layer(&manifest).unwrap();
        assert_eq!(chosen.digest, "sha256:tagged");
    }

    #[test]
    fn strips_scheme_before_parsing_oci_reference() {
        let client: Arc<dyn OciClient> = Arc::new(pipeline_oci::HttpOciClient::default());
        let layer = OciRegistryLayer::new(
            client,
            Some(RepositoryContext::new("https://example.invalid/ocm")),
            None,
        )
        .unwrap();
        let id = ComponentIdentity::new("Example/Widget", "1.0.0");
        let reference = layer
            .oci_reference(&id, &RepositoryContext::new("https://example.invalid/ocm"))
            .unwrap();
        assert_eq!(reference.host, "example.invalid");
        assert_eq!(
            reference.repository,
            "ocm/component-descriptors/example/widget"
        );
    }
}
