//! Verbatim-where-possible replication of OCI artifacts between registries,
//! including on-the-fly schema v1 -> v2 conversion and multi-arch handling,
//! grounded in `oci/__init__.py::replicate_artifact`.

use std::collections::BTreeMap;
use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::client::OciClient;
use crate::error::OciError;
use crate::manifest::{
    Descriptor, ImageManifest, Manifest, ManifestList, ManifestV1, Platform,
    MEDIA_TYPE_MANIFEST_LIST,
};
use crate::reference::{Locator, OciImageReference};

/// `oci/__init__.py::ReplicationMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// Do not send an `Accept` header; the source registry chooses the variant.
    RegistryDefaults,
    /// Send an `Accept` header that favours manifest-list/image-index media types.
    PreferMultiarch,
    /// As `PreferMultiarch`; if the source turns out to be a single-image
    /// manifest, wrap it in a one-entry manifest list.
    NormaliseToMultiarch,
}

const ACCEPT_MULTIARCH: &str = "application/vnd.docker.distribution.manifest.list.v2+json, application/vnd.oci.image.index.v1+json, application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json";

impl ReplicationMode {
    #[must_use]
    pub fn accept_header(self) -> Option<&'static str> {
        match self {
            ReplicationMode::RegistryDefaults => None,
            ReplicationMode::PreferMultiarch | ReplicationMode::NormaliseToMultiarch => {
                Some(ACCEPT_MULTIARCH)
            }
        }
    }
}

/// A manifest-list depth cap: the Python original recurses unboundedly through
/// `replicate_artifact`; this port uses an explicit worklist with a hard depth
/// cap instead (documented deviation, see DESIGN.md).
const MAX_MANIFEST_LIST_DEPTH: u32 = 4;

pub type PlatformFilter<'a> = dyn Fn(&Platform) -> bool + Send + Sync + 'a;

/// Result of one `replicate` call: the raw HTTP-equivalent status is represented
/// by `()` since [`OciClient::put_manifest`] already surfaces transport errors;
/// what callers need back is the possibly-rewritten target reference and the
/// final manifest bytes (for verbatim-comparison tests, P5/P6).
pub struct ReplicationOutcome {
    pub target_reference: OciImageReference,
    pub manifest_bytes: Bytes,
}

pub async fn replicate(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    mode: ReplicationMode,
    platform_filter: Option<&PlatformFilter<'_>>,
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<ReplicationOutcome, OciError> {
    replicate_inner(client, src, tgt, mode, platform_filter, annotations, 0).await
}

#[allow(clippy::too_many_arguments)]
async fn replicate_inner(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    mode: ReplicationMode,
    platform_filter: Option<&PlatformFilter<'_>>,
    annotations: Option<&BTreeMap<String, String>>,
    depth: u32,
) -> Result<ReplicationOutcome, OciError> {
    if depth > MAX_MANIFEST_LIST_DEPTH {
        return Err(OciError::ManifestListTooDeep {
            max_depth: MAX_MANIFEST_LIST_DEPTH,
        });
    }

    let (raw, media_type) = client.manifest_raw(src, mode.accept_header()).await?;
    let manifest = Manifest::parse(media_type.as_deref(), &raw)?;

    match manifest {
        Manifest::V1(v1) => replicate_v1(client, src, tgt, &v1, annotations).await,
        Manifest::List(list) => {
            replicate_list(
                client,
                src,
                tgt,
                list,
                mode,
                platform_filter,
                annotations,
                depth,
            )
            .await
        }
        Manifest::V2(v2) => {
            if mode == ReplicationMode::NormaliseToMultiarch {
                replicate_normalised(client, src, tgt, v2, annotations, depth).await
            } else {
                replicate_v2(client, src, tgt, v2, annotations).await
            }
        }
    }
}

async fn replicate_v1(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    v1: &ManifestV1,
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<ReplicationOutcome, OciError> {
    warn!(%src, "manifest is schemaVersion 1; cannot replicate verbatim, converting to v2");

    let mut uncompressed_digests = Vec::with_capacity(v1.fs_layers.len());
    let layers: Vec<Descriptor> = v1
        .fs_layers
        .iter()
        .map(|l| Descriptor {
            media_type: "application/vnd.docker.image.rootfs.diff.tar.gzip".to_string(),
            size: 0,
            digest: l.blob_sum.clone(),
            platform: None,
            annotations: None,
        })
        .collect();

    for layer in &layers {
        let head_ok = client.head_blob(tgt, &layer.digest).await?;
        let gz = client.blob(src, &layer.digest).await?;
        let diff_id = sha256_of_gunzip(&gz)?;
        uncompressed_digests.push(diff_id);
        if !head_ok {
            client.put_blob(tgt, &layer.digest, gz).await?;
        }
    }

    let history = v1
        .history
        .first()
        .ok_or(OciError::MissingV1History)?;
    let mut cfg: serde_json::Value = serde_json::from_str(&history.v1_compatibility)?;
    cfg["rootfs"] = serde_json::json!({
        "type": "layers",
        "diff_ids": uncompressed_digests,
    });
    let cfg_bytes = serde_json::to_vec(&cfg)?;
    let cfg_digest = format!("sha256:{}", sha256_hex(&cfg_bytes));
    client
        .put_blob(tgt, &cfg_digest, Bytes::from(cfg_bytes.clone()))
        .await?;

    let mut manifest = ImageManifest {
        schema_version: 2,
        media_type: crate::manifest::MEDIA_TYPE_MANIFEST_V2.to_string(),
        config: Descriptor {
            media_type: crate::manifest::MEDIA_TYPE_CONFIG.to_string(),
            size: cfg_bytes.len() as u64,
            digest: cfg_digest,
            platform: None,
            annotations: None,
        },
        layers,
        annotations: None,
    };
    apply_annotations(&mut manifest.annotations, annotations);

    finalize_manifest(client, tgt, &manifest).await
}

async fn replicate_v2(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    mut manifest: ImageManifest,
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<ReplicationOutcome, OciError> {
    for blob in manifest.config_then_layers() {
        if client.head_blob(tgt, &blob.digest).await? {
            debug!(digest = %blob.digest, "blob already present in target, skipping");
            continue;
        }
        let data = client.blob(src, &blob.digest).await?;
        client.put_blob(tgt, &blob.digest, data).await?;
    }

    apply_annotations(&mut manifest.annotations, annotations);
    finalize_manifest(client, tgt, &manifest).await
}

async fn replicate_normalised(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    manifest: ImageManifest,
    annotations: Option<&BTreeMap<String, String>>,
    depth: u32,
) -> Result<ReplicationOutcome, OciError> {
    let digest_src = if matches!(src.locator, Locator::Digest(_)) {
        src.clone()
    } else {
        client.to_digest_hash(src).await?
    };
    let platform = platform_from_config(client, src, &manifest).await?;

    let digest_tag = match &digest_src.locator {
        Locator::Digest(d) => d.clone(),
        Locator::Tag(t) => t.clone(),
    };
    let single_image_tgt = tgt.with_digest(digest_tag);

    let inner = Box::pin(replicate_inner(
        client,
        &digest_src,
        &single_image_tgt,
        ReplicationMode::PreferMultiarch,
        None,
        annotations,
        depth + 1,
    ))
    .await?;

    let entry = Descriptor {
        media_type: manifest.media_type.clone(),
        size: inner.manifest_bytes.len() as u64,
        digest: format!("sha256:{}", sha256_hex(&inner.manifest_bytes)),
        platform: Some(platform),
        annotations: None,
    };

    let list = ManifestList {
        schema_version: 2,
        media_type: MEDIA_TYPE_MANIFEST_LIST.to_string(),
        manifests: vec![entry],
    };
    let bytes = Bytes::from(serde_json::to_vec(&list)?);
    let target_reference = digest_tagged(tgt, &bytes);
    client
        .put_manifest(&target_reference, &list.media_type, &bytes)
        .await?;

    Ok(ReplicationOutcome {
        target_reference,
        manifest_bytes: bytes,
    })
}

#[allow(clippy::too_many_arguments)]
async fn replicate_list(
    client: &dyn OciClient,
    src: &OciImageReference,
    tgt: &OciImageReference,
    mut list: ManifestList,
    mode: ReplicationMode,
    platform_filter: Option<&PlatformFilter<'_>>,
    annotations: Option<&BTreeMap<String, String>>,
    depth: u32,
) -> Result<ReplicationOutcome, OciError> {
    let mut manifest_dirty = false;
    let mut kept = Vec::with_capacity(list.manifests.len());

    for sub in list.manifests.into_iter() {
        let sub_src = src.with_digest(sub.digest.clone());

        if let Some(filter) = platform_filter {
            let platform = match &sub.platform {
                Some(p) => p.clone(),
                None => platform_from_ref(client, &sub_src).await?,
            };
            if !filter(&platform) {
                info!(?platform, src = %sub_src, "skipping platform, excluded by filter");
                manifest_dirty = true;
                continue;
            }
        }

        let sub_outcome = Box::pin(replicate_inner(
            client,
            &sub_src,
            tgt,
            mode,
            None,
            annotations,
            depth + 1,
        ))
        .await?;

        let new_digest = format!("sha256:{}", sha256_hex(&sub_outcome.manifest_bytes));
        let mut patched = sub;
        if new_digest != patched.digest {
            patched.digest = new_digest;
            patched.size = sub_outcome.manifest_bytes.len() as u64;
            manifest_dirty = true;
        }
        kept.push(patched);
    }

    list.manifests = kept;
    if manifest_dirty {
        debug!(target = %tgt, "manifest list changed during replication (filtered platform or rewritten digest)");
    }

    let bytes = Bytes::from(serde_json::to_vec(&list)?);
    let target_reference = digest_tagged(tgt, &bytes);
    client
        .put_manifest(&target_reference, &list.media_type, &bytes)
        .await?;

    Ok(ReplicationOutcome {
        target_reference,
        manifest_bytes: bytes,
    })
}

async fn finalize_manifest(
    client: &dyn OciClient,
    tgt: &OciImageReference,
    manifest: &ImageManifest,
) -> Result<ReplicationOutcome, OciError> {
    let bytes = Bytes::from(serde_json::to_vec(manifest)?);
    let target_reference = digest_tagged(tgt, &bytes);
    client
        .put_manifest(&target_reference, &manifest.media_type, &bytes)
        .await?;
    Ok(ReplicationOutcome {
        target_reference,
        manifest_bytes: bytes,
    })
}

/// If the target has no symbolic tag, rewrite it to `<repo>@sha256:<digest>`
/// before the final manifest PUT.
fn digest_tagged(tgt: &OciImageReference, manifest_bytes: &[u8]) -> OciImageReference {
    if matches!(tgt.locator, Locator::Tag(_)) {
        return tgt.clone();
    }
    tgt.with_digest(format!("sha256:{}", sha256_hex(manifest_bytes)))
}

/// Merges `annotations` into `existing`, writing a key only if it is absent or
/// the value differs — avoids reserialisation-induced digest drift when nothing
/// actually changed.
fn apply_annotations(
    existing: &mut Option<serde_json::Map<String, serde_json::Value>>,
    annotations: Option<&BTreeMap<String, String>>,
) {
    let Some(annotations) = annotations else {
        return;
    };
    let map = existing.get_or_insert_with(serde_json::Map::new);
    for (k, v) in annotations {
        let value = serde_json::Value::String(v.clone());
        if map.get(k) == Some(&value) {
            continue;
        }
        map.insert(k.clone(), value);
    }
}

async fn platform_from_config(
    client: &dyn OciClient,
    reference: &OciImageReference,
    manifest: &ImageManifest,
) -> Result<Platform, OciError> {
    let cfg_bytes = client.blob(reference, &manifest.config.digest).await?;
    let cfg: serde_json::Value = serde_json::from_slice(&cfg_bytes)?;
    Ok(Platform {
        architecture: cfg
            .get("architecture")
            .and_then(|v| v.as_str())
            .unwrap_or("amd64")
            .to_string(),
        os: cfg
            .get("os")
            .and_then(|v| v.as_str())
            .unwrap_or("linux")
            .to_string(),
        variant: cfg
            .get("variant")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

async fn platform_from_ref(
    client: &dyn OciClient,
    reference: &OciImageReference,
) -> Result<Platform, OciError> {
    let manifest = client.manifest(reference, None).await?;
    match manifest {
        Manifest::V2(m) => platform_from_config(client, reference, &m).await,
        _ => Ok(Platform {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            variant: None,
        }),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Streams `gz` through a gzip decompressor and hashes the decompressed byte
/// stream to produce a `diff_id`.
fn sha256_of_gunzip(gz: &[u8]) -> Result<String, OciError> {
    let mut decoder = GzDecoder::new(gz);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_header_only_set_for_multiarch_modes() {
        assert_eq!(ReplicationMode::RegistryDefaults.accept_header(), None);
        assert!(ReplicationMode::PreferMultiarch.accept_header().is_some());
        assert!(ReplicationMode::NormaliseToMultiarch.accept_header().is_some());
    }

    #[test]
    fn annotations_are_only_written_when_absent_or_different() {
        let mut existing = Some(serde_json::Map::from_iter([(
            "a".to_string(),
            serde_json::Value::String("1".to_string()),
        )]));
        let mut wanted = BTreeMap::new();
        wanted.insert("a".to_string(), "1".to_string());
        wanted.insert("b".to_string(), "2".to_string());
        apply_annotations(&mut existing, Some(&wanted));
        let map = existing.unwrap();
        assert_eq!(map.get("a").unwrap(), "1");
        assert_eq!(map.get("b").unwrap(), "2");
    }

    #[test]
    fn digest_tagged_leaves_symbolic_tags_alone() {
        let tgt = OciImageReference::parse("registry.example/org/repo:v1").unwrap();
        let out = digest_tagged(&tgt, b"manifest-bytes");
        assert_eq!(out, tgt);
    }

    #[test]
    fn digest_tagged_rewrites_bare_repo_references() {
        let tgt = OciImageReference::parse("registry.example/org/repo@sha256:deadbeef").unwrap();
        let out = digest_tagged(&tgt, b"manifest-bytes");
        assert!(matches!(out.locator, Locator::Digest(_)));
    }
}
