use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::repository::{GeneratedHint, HintGenerationRequest, HintGenerator, HintGeneratorError};

/// Calls the external content service over HTTP. One request, no retries.
#[derive(Debug, Clone)]
pub struct HttpHintGenerator {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpHintGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, HintGeneratorError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HintGeneratorError::Transport(err.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HintGenerator for HttpHintGenerator {
    async fn generate(
        &self,
        request: HintGenerationRequest,
    ) -> Result<GeneratedHint, HintGeneratorError> {
        debug!(
            endpoint = %self.endpoint,
            course = %request.course.id,
            topic = %request.topic.id,
            challenge = %request.challenge.id,
            has_attempt = request.attempt.is_some(),
            "requesting generated hint"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                warn!(endpoint = %self.endpoint, error = %err, "hint generator unreachable");
                HintGeneratorError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "hint generator rejected request");
            return Err(HintGeneratorError::Status(status.as_u16()));
        }

        let generated: GeneratedHint = response
            .json()
            .await
            .map_err(|err| HintGeneratorError::Transport(err.to_string()))?;

        if generated.hint.trim().is_empty() {
            return Err(HintGeneratorError::EmptyHint);
        }

        Ok(generated)
    }
}
