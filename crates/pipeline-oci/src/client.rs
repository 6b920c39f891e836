//! The `OciClient` trait: the narrow contract the replicator and the
//! component-descriptor registry layer both depend on.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::OciError;
use crate::manifest::Manifest;
use crate::reference::OciImageReference;

/// Abstract OCI distribution-spec client. A production implementation talks to a
/// real registry over HTTPS; tests substitute a `wiremock` server or an in-memory
/// fake.
#[async_trait]
pub trait OciClient: Send + Sync {
    /// Fetches and parses the manifest for `reference`. `accept` is forwarded as
    /// the `Accept` header verbatim (or omitted if `None`), per
    /// [`crate::replicator::ReplicationMode`].
    async fn manifest(
        &self,
        reference: &OciImageReference,
        accept: Option<&str>,
    ) -> Result<Manifest, OciError>;

    /// Like [`OciClient::manifest`] but returns the raw response bytes plus the
    /// `mediaType` the registry actually sent (header or body), needed for
    /// verbatim replication.
    async fn manifest_raw(
        &self,
        reference: &OciImageReference,
        accept: Option<&str>,
    ) -> Result<(Bytes, Option<String>), OciError>;

    async fn put_manifest(
        &self,
        reference: &OciImageReference,
        media_type: &str,
        body: &[u8],
    ) -> Result<(), OciError>;

    async fn blob(&self, reference: &OciImageReference, digest: &str) -> Result<Bytes, OciError>;

    /// `true` if the blob already exists at `reference`'s repository (HEAD).
    async fn head_blob(&self, reference: &OciImageReference, digest: &str) -> Result<bool, OciError>;

    async fn put_blob(
        &self,
        reference: &OciImageReference,
        digest: &str,
        data: Bytes,
    ) -> Result<(), OciError>;

    async fn tags(&self, reference: &OciImageReference) -> Result<Vec<String>, OciError>;

    /// Resolves `reference`'s current tag to the digest it currently points at,
    /// returning an equivalent digest-pinned reference.
    async fn to_digest_hash(
        &self,
        reference: &OciImageReference,
    ) -> Result<OciImageReference, OciError>;
}

/// [`OciClient`] backed by a real registry over `reqwest`.
pub struct HttpOciClient {
    http: reqwest::Client,
}

impl HttpOciClient {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for HttpOciClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl OciClient for HttpOciClient {
    async fn manifest(
        &self,
        reference: &OciImageReference,
        accept: Option<&str>,
    ) -> Result<Manifest, OciError> {
        let (bytes, media_type) = self.manifest_raw(reference, accept).await?;
        Manifest::parse(media_type.as_deref(), &bytes).map_err(OciError::from)
    }

    async fn manifest_raw(
        &self,
        reference: &OciImageReference,
        accept: Option<&str>,
    ) -> Result<(Bytes, Option<String>), OciError> {
        let url = reference.manifest_url();
        let mut req = self.http.get(&url);
        if let Some(accept) = accept {
            req = req.header(reqwest::header::ACCEPT, accept);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(OciError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        let media_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?;
        Ok((bytes, media_type))
    }

    async fn put_manifest(
        &self,
        reference: &OciImageReference,
        media_type: &str,
        body: &[u8],
    ) -> Result<(), OciError> {
        let url = reference.manifest_url();
        let resp = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, media_type)
            .body(body.to_vec())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OciError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(())
    }

    async fn blob(&self, reference: &OciImageReference, digest: &str) -> Result<Bytes, OciError> {
        let url = reference.blob_url(digest);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(OciError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(resp.bytes().await?)
    }

    async fn head_blob(&self, reference: &OciImageReference, digest: &str) -> Result<bool, OciError> {
        let url = reference.blob_url(digest);
        let resp = self.http.head(&url).send().await?;
        Ok(resp.status().is_success())
    }

    async fn put_blob(
        &self,
        reference: &OciImageReference,
        digest: &str,
        data: Bytes,
    ) -> Result<(), OciError> {
        let url = reference.blob_url(digest);
        let resp = self.http.put(&url).body(data).send().await?;
        if !resp.status().is_success() {
            return Err(OciError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(())
    }

    async fn tags(&self, reference: &OciImageReference) -> Result<Vec<String>, OciError> {
        let url = format!(
            "https://{}/v2/{}/tags/list",
            reference.host, reference.repository
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(OciError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }
        #[derive(serde::Deserialize)]
        struct TagsResponse {
            tags: Vec<String>,
        }
        let parsed: TagsResponse = resp.json().await?;
        Ok(parsed.tags)
    }

    async fn to_digest_hash(
        &self,
        reference: &OciImageReference,
    ) -> Result<OciImageReference, OciError> {
        let (bytes, _) = self.manifest_raw(reference, None).await?;
        let digest = format!("sha256:{}", sha256_hex(&bytes));
        Ok(reference.with_digest(digest))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
