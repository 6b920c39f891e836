//! Delivery-service layer: a read-mostly HTTP lookup against a central
//! component-descriptor service. Unlike the other layers this one never
//! offers a write-back — the delivery service owns its own ingestion
//! pipeline.

use async_trait::async_trait;
use pipeline_config::{ComponentDescriptor, ComponentIdentity, RepositoryContext};
use tracing::debug;

use crate::error::LookupError;
use crate::layer::{ComponentDescriptorLayer, LookupOutcome};

pub struct DeliveryServiceLayer {
    http: reqwest::Client,
    base_url: String,
}

impl DeliveryServiceLayer {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn lookup_url(&self, identity: &ComponentIdentity) -> String {
        format!(
            "{}/api/v1/component?component_name={}&version={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&identity.name),
            urlencoding::encode(&identity.version),
        )
    }
}

#[async_trait]
impl ComponentDescriptorLayer for DeliveryServiceLayer {
    async fn get(
        &self,
        identity: &ComponentIdentity,
        _ctx: Option<&RepositoryContext>,
    ) -> Result<LookupOutcome, LookupError> {
        let url = self.lookup_url(identity);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(component = %identity, "delivery-service miss");
            return Ok(LookupOutcome::NotFound(None));
        }
        if !resp.status().is_success() {
            return Err(LookupError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url,
            });
        }

        let body = resp.text().await?;
        let descriptor = ComponentDescriptor::from_yaml(&body)?;
        debug!(component = %identity, "delivery-service hit");
        Ok(LookupOutcome::Found(descriptor))
    }

    fn name(&self) -> &'static str {
        "delivery-service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_not_found_outcome_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/component"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let layer = DeliveryServiceLayer::new(reqwest::Client::new(), server.uri());
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");
        let outcome = layer.get(&id, None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::NotFound(None)));
    }

    #[tokio::test]
    async fn parses_yaml_body_on_success() {
        let server = MockServer::start().await;
        let descriptor = ComponentDescriptor {
            identity: ComponentIdentity::new("example.com/widget", "1.0.0"),
            resources: vec![],
            sources: vec![],
            component_references: vec![],
            repository_contexts: vec![],
        };
        Mock::given(method("GET"))
            .and(path("/api/v1/component"))
            .respond_with(ResponseTemplate::new(200).set_body_string(descriptor.to_yaml().unwrap()))
            .mount(&server)
            .await;

        let layer = DeliveryServiceLayer::new(reqwest::Client::new(), server.uri());
        let id = ComponentIdentity::new("example.com/widget", "1.0.0");
        let outcome = layer.get(&id, None).await.unwrap();
        assert!(matches!(outcome, LookupOutcome::Found(_)));
    }
}
