//! Filesystem cache layer: `<cache_dir>/<slash-to-dash(base_url)>/<name>-<version>`,
//! written via a temp file in the same directory followed by an atomic rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};
use tracing::debug;

use crate::error::LookupError;
use crate::layer::{ComponentDescriptorLayer, LookupOutcome, WriteBack};
use crate::mapping::RepositoryMappingConfig;

pub struct FilesystemLayer {
    cache_dir: PathBuf,
    default_ctx: Option<RepositoryContext>,
    mapping: Option<RepositoryMappingConfig>,
}

impl FilesystemLayer {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        default_ctx: Option<RepositoryContext>,
        mapping: Option<RepositoryMappingConfig>,
    ) -> Result<Self, LookupError> {
        if default_ctx.is_some() && mapping.is_some() {
            return Err(LookupError::MappingAndDefaultContextConflict);
        }
        Ok(Self {
            cache_dir: cache_dir.into(),
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

    fn descriptor_path(&self, identity: &ComponentIdentity, ctx: &RepositoryContext) -> PathBuf {
        self.cache_dir
            .join(ctx.slug())
            .join(format!("{}-{}", identity.name, identity.version))
    }
}

struct FilesystemWriteBack {
    path: PathBuf,
}

#[async_trait]
impl WriteBack for FilesystemWriteBack {
    async fn write_back(
        &self,
        _identity: &ComponentIdentity,
        descriptor: &ComponentDescriptor,
    ) -> Result<(), LookupError> {
        write_atomically(&self.path, descriptor).await
    }
}

async fn write_atomically(path: &Path, descriptor: &ComponentDescriptor) -> Result<(), LookupError> {
    let base_dir = path.parent().ok_or_else(|| LookupError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory"),
    })?;
    tokio::fs::create_dir_all(base_dir)
        .await
        .map_err(|source| LookupError::Io {
            path: base_dir.display().to_string(),
            source,
        })?;

    let yaml = descriptor.to_yaml()?;
    let base_dir = base_dir.to_path_buf();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), LookupError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&base_dir).map_err(|source| LookupError::Io {
            path: base_dir.display().to_string(),
            source,
        })?;
        use std::io::Write;
        tmp.write_all(yaml.as_bytes()).map_err(|source| LookupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| LookupError::Io {
            path: path.display().to_string(),
            source: e.error,
        })?;
        Ok(())
    })
    .await
    .expect("filesystem write task panicked")
}

#[async_trait]
impl ComponentDescriptorLayer for FilesystemLayer {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError> {
        for candidate in self.candidate_contexts(identity, ctx) {
            let path = self.descriptor_path(identity, &candidate);
            if path.is_file() {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| LookupError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                debug!(component = %identity, path = %path.display(), "filesystem cache hit");
                return Ok(LookupOutcome::Found(ComponentDescriptor::from_yaml(&raw)?));
            }
        }

        let write_back_path = self
            .candidate_contexts(identity, ctx)
            .into_iter()
            .next()
            .map(|candidate| self.descriptor_path(identity, &candidate));

        Ok(LookupOutcome::NotFound(write_back_path.map(|path| {
            Box::new(FilesystemWriteBack { path }) as Box<dyn WriteBack>
        })))
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_back_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let layer = FilesystemLayer::new(
            dir.path(),
            Some(RepositoryContext::new("https://ocm.example")),
            None,
        )
        .unwrap();
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");

        let outcome = layer.get(&id, None).await.unwrap();
        let LookupOutcome::NotFound(Some(write_back)) = outcome else {
            panic!("expected a miss with a write-back");
        };

        let mut descriptor = ComponentDescriptor {
            identity: id.clone(),
            resources: vec![],
            sources: vec![],
            component_references: vec![],
            repository_contexts: vec![RepositoryContext::new("https://ocm.example")],
        };
        write_back.write_back(&id, &descriptor).await.unwrap();
        descriptor.resources.clear();

        let outcome = layer.get(&id, None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::Found(_)));
    }
}
