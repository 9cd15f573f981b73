use crate::error::{Error, Result};
use crate::services::submission_service::AudioAnalyzer;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

/// Hands a finished submission to the audio submission relay.
#[derive(Clone)]
pub struct HttpAudioAnalyzer {
    client: Client,
    submit_url: String,
}

impl HttpAudioAnalyzer {
    pub fn new(client: Client, submit_url: String) -> Self {
        Self { client, submit_url }
    }
}

#[async_trait]
impl AudioAnalyzer for HttpAudioAnalyzer {
    async fn analyze(&self, audio_urls: Vec<String>, submission_id: Uuid) -> Result<()> {
        let resp = self
            .client
            .post(&self.submit_url)
            .json(&json!({
                "submission_id": submission_id,
                "audio_urls": audio_urls,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// Forwards submissions to the scoring backend.
#[derive(Clone)]
pub struct AnalysisRelay {
    client: Client,
    backend_url: String,
}

impl AnalysisRelay {
    pub fn new(client: Client, backend_url: String) -> Self {
        Self {
            client,
            backend_url,
        }
    }

    pub fn submit_endpoint(&self) -> String {
        format!("{}/api/v1/submission/submit", self.backend_url)
    }

    pub async fn forward(&self, submission_id: &str, audio_urls: &[String]) -> Result<()> {
        // The scoring backend calls the id `submission_url`.
        let payload = json!({
            "submission_url": submission_id,
            "audio_urls": audio_urls,
        });
        let resp = self
            .client
            .post(self.submit_endpoint())
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Analysis(format!(
                "Scoring backend returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Fire-and-forget variant used by the relay endpoint.
    pub fn spawn_forward(&self, submission_id: String, audio_urls: Vec<String>) {
        let relay = self.clone();
        tokio::spawn(async move {
            if let Err(e) = relay.forward(&submission_id, &audio_urls).await {
                tracing::error!(%submission_id, error = %e, "Failed to forward audio submission");
            } else {
                tracing::info!(%submission_id, "Audio submission forwarded");
            }
        });
    }
}
