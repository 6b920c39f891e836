//! OCI/Docker manifest document types. Both the legacy Docker v1
//! ("schema1") format and the current v2/image-index formats are modeled,
//! since source registries may still serve the former.

use serde::{Deserialize, Serialize};

pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// A content-addressed reference to a blob within a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A schema-2 (or OCI) image manifest: one config blob plus an ordered list
/// of layer blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A manifest list (or OCI image index): a fan-out to one manifest per
/// platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestList {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
}

/// A single entry of a schema-1 `history` array: an opaque, Docker-specific
/// JSON blob (`v1Compatibility`) describing one image layer's metadata. Only
/// the first entry matters for config-blob synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V1HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// A legacy schema-1 manifest, as still served by some older registries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestV1 {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub name: String,
    pub tag: String,
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<V1HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

/// The union of manifest shapes a registry may return for a `GET
/// /v2/<repo>/manifests/<ref>` request, disambiguated by the `mediaType`
/// field (schema1 manifests predate that convention and are detected by the
/// presence of `fsLayers` instead).
#[derive(Debug, Clone)]
pub enum Manifest {
    V1(ManifestV1),
    V2(ImageManifest),
    List(ManifestList),
}

impl ImageManifest {
    /// Iterates the config blob followed by each layer, the order the
    /// replicator copies blobs in.
    pub fn config_then_layers(&self) -> impl Iterator<Item = &Descriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }
}

impl Manifest {
    pub fn parse(media_type: Option<&str>, body: &[u8]) -> Result<Self, serde_json::Error> {
        match media_type {
            Some(MEDIA_TYPE_MANIFEST_LIST) | Some(MEDIA_TYPE_OCI_INDEX) => {
                Ok(Manifest::List(serde_json::from_slice(body)?))
            }
            Some(MEDIA_TYPE_MANIFEST_V2) | Some(MEDIA_TYPE_OCI_MANIFEST) => {
                Ok(Manifest::V2(serde_json::from_slice(body)?))
            }
            _ => {
                // No (or an unrecognised) media type header: sniff the body,
                // the way the original replicator does for legacy registries.
                let value: serde_json::Value = serde_json::from_slice(body)?;
                if value.get("fsLayers").is_some() {
                    Ok(Manifest::V1(serde_json::from_value(value)?))
                } else if value.get("manifests").is_some() {
                    Ok(Manifest::List(serde_json::from_value(value)?))
                } else {
                    Ok(Manifest::V2(serde_json::from_value(value)?))
                }
            }
        }
    }

    #[must_use]
    pub fn media_type(&self) -> &str {
        match self {
            Manifest::V1(_) => "application/vnd.docker.distribution.manifest.v1+json",
            Manifest::V2(m) => &m.media_type,
            Manifest::List(m) => &m.media_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v2_manifest_by_media_type() {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_V2,
            "config": {"mediaType": MEDIA_TYPE_CONFIG, "size": 10, "digest": "sha256:a"},
            "layers": [],
        })
        .to_string();
        let m = Manifest::parse(Some(MEDIA_TYPE_MANIFEST_V2), body.as_bytes()).unwrap();
        assert!(matches!(m, Manifest::V2(_)));
    }

    #[test]
    fn sniffs_v1_manifest_when_media_type_missing() {
        let body = serde_json::json!({
            "schemaVersion": 1,
            "name": "org/repo",
            "tag": "latest",
            "fsLayers": [{"blobSum": "sha256:a"}],
            "history": [{"v1Compatibility": "{}"}],
        })
        .to_string();
        let m = Manifest::parse(None, body.as_bytes()).unwrap();
        assert!(matches!(m, Manifest::V1(_)));
    }

    #[test]
    fn sniffs_manifest_list_when_media_type_missing() {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_LIST,
            "manifests": [],
        })
        .to_string();
        let m = Manifest::parse(None, body.as_bytes()).unwrap();
        assert!(matches!(m, Manifest::List(_)));
    }
}
