//! `CiBackendClient`: the narrow REST surface the deployer, orchestrator, and
//! webhook dispatcher depend on. The concrete `HttpCiBackendClient` targets a
//! Concourse-style ATC API, matching the shape of
//! `concourse.client.api.ConcourseApiBase`.

use async_trait::async_trait;
use pipeline_config::Build;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use tracing::debug;

use crate::error::CiBackendError;
use crate::model::{PipelineConfig, PipelineConfigResource, ResourceType, ResourceVersion, SetPipelineResult};

#[async_trait]
pub trait CiBackendClient: Send + Sync {
    async fn set_pipeline(&self, name: &str, body: &str) -> Result<SetPipelineResult, CiBackendError>;
    async fn unpause_pipeline(&self, name: &str) -> Result<(), CiBackendError>;
    async fn expose_pipeline(&self, name: &str) -> Result<(), CiBackendError>;
    async fn pipelines(&self) -> Result<Vec<String>, CiBackendError>;
    async fn delete_pipeline(&self, name: &str) -> Result<(), CiBackendError>;
    async fn pipeline_resources(
        &self,
        pipeline_names: &[String],
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<PipelineConfigResource>, CiBackendError>;
    async fn trigger_resource_check(&self, pipeline: &str, resource: &str) -> Result<(), CiBackendError>;
    async fn order_pipelines(&self, names: &[String]) -> Result<(), CiBackendError>;
    async fn pipeline_cfg(&self, name: &str) -> Result<PipelineConfig, CiBackendError>;
    async fn job_builds(&self, pipeline: &str, job: &str) -> Result<Vec<Build>, CiBackendError>;
    async fn abort_build(&self, build_id: &str) -> Result<(), CiBackendError>;
    async fn resource_versions(
        &self,
        pipeline: &str,
        resource: &str,
    ) -> Result<Vec<ResourceVersion>, CiBackendError>;
}

/// [`CiBackendClient`] implementation backed by a real Concourse-compatible
/// ATC API, scoped to a single `(base_url, team_name)` pair the way
/// `ccc.concourse.client_from_cfg_name` hands back a team-scoped client.
pub struct HttpCiBackendClient {
    http: reqwest::Client,
    base_url: String,
    team_name: String,
}

impl HttpCiBackendClient {
    pub fn new(
        base_url: impl Into<String>,
        team_name: impl Into<String>,
        auth_token: Option<&str>,
    ) -> Result<Self, CiBackendError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| CiBackendError::UnknownSetPipelineResult)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            team_name: team_name.into(),
        })
    }

    fn team_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/teams/{}{}",
            self.base_url.trim_end_matches('/'),
            self.team_name,
            path
        )
    }

    async fn send_ok(&self, req: reqwest::RequestBuilder) -> Result<(), CiBackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(CiBackendError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, CiBackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(CiBackendError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[derive(Serialize)]
struct OrderPipelinesRequest<'a> {
    pipelines: &'a [String],
}

#[async_trait]
impl CiBackendClient for HttpCiBackendClient {
    async fn set_pipeline(&self, name: &str, body: &str) -> Result<SetPipelineResult, CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{name}/config"));
        let resp = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-yaml")
            .body(body.to_string())
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            let response_body = resp.bytes().await.unwrap_or_default();
            return Err(CiBackendError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body: String::from_utf8_lossy(&response_body).into_owned(),
            });
        }
        if !status.is_success() {
            let response_body = resp.text().await.unwrap_or_default();
            return Err(CiBackendError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body: response_body,
            });
        }
        if status == reqwest::StatusCode::CREATED {
            Ok(SetPipelineResult::Created)
        } else {
            Ok(SetPipelineResult::Updated)
        }
    }

    async fn unpause_pipeline(&self, name: &str) -> Result<(), CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{name}/unpause"));
        self.send_ok(self.http.put(&url)).await
    }

    async fn expose_pipeline(&self, name: &str) -> Result<(), CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{name}/expose"));
        self.send_ok(self.http.put(&url)).await
    }

    async fn pipelines(&self) -> Result<Vec<String>, CiBackendError> {
        #[derive(serde::Deserialize)]
        struct PipelineSummary {
            name: String,
        }
        let url = self.team_url("/pipelines");
        let summaries: Vec<PipelineSummary> = self.send_json(self.http.get(&url)).await?;
        Ok(summaries.into_iter().map(|p| p.name).collect())
    }

    async fn delete_pipeline(&self, name: &str) -> Result<(), CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{name}"));
        self.send_ok(self.http.delete(&url)).await
    }

    async fn pipeline_resources(
        &self,
        pipeline_names: &[String],
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<PipelineConfigResource>, CiBackendError> {
        let mut resources = Vec::new();
        for pipeline_name in pipeline_names {
            let url = self.team_url(&format!("/pipelines/{pipeline_name}/resources"));
            let pipeline_resources: Vec<PipelineConfigResource> =
                self.send_json(self.http.get(&url)).await?;
            resources.extend(
                pipeline_resources
                    .into_iter()
                    .filter(|r| resource_type.is_none_or(|t| r.resource_type == t)),
            );
        }
        debug!(count = resources.len(), "fetched pipeline resources");
        Ok(resources)
    }

    async fn trigger_resource_check(&self, pipeline: &str, resource: &str) -> Result<(), CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{pipeline}/resources/{resource}/check"));
        self.send_ok(self.http.post(&url).json(&serde_json::json!({}))).await
    }

    async fn order_pipelines(&self, names: &[String]) -> Result<(), CiBackendError> {
        let url = self.team_url("/pipelines/ordering");
        self.send_ok(self.http.put(&url).json(names)).await
    }

    async fn pipeline_cfg(&self, name: &str) -> Result<PipelineConfig, CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{name}/config"));
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CiBackendError::PipelineNotFound(name.to_string()));
        }
        #[derive(serde::Deserialize)]
        struct ConfigResponse {
            config: PipelineConfig,
        }
        let status = resp.status();
        if !status.is_success() {
            let response_url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(CiBackendError::UnexpectedStatus {
                status: status.as_u16(),
                url: response_url,
                body,
            });
        }
        let parsed: ConfigResponse = resp.json().await?;
        Ok(parsed.config)
    }

    async fn job_builds(&self, pipeline: &str, job: &str) -> Result<Vec<Build>, CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{pipeline}/jobs/{job}/builds"));
        self.send_json(self.http.get(&url)).await
    }

    async fn abort_build(&self, build_id: &str) -> Result<(), CiBackendError> {
        let url = format!(
            "{}/api/v1/builds/{build_id}/abort",
            self.base_url.trim_end_matches('/')
        );
        self.send_ok(self.http.put(&url)).await
    }

    async fn resource_versions(
        &self,
        pipeline: &str,
        resource: &str,
    ) -> Result<Vec<ResourceVersion>, CiBackendError> {
        let url = self.team_url(&format!("/pipelines/{pipeline}/resources/{resource}/versions"));
        self.send_json(self.http.get(&url)).await
    }
}
