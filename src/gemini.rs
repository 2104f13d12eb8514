// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini API client for remote multimodal inference

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{Result, StudySnapError};

/// Generative Language API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1beta")
            .to_string();

        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Whether a service credential is configured
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| StudySnapError::Config("No API key configured".to_string()))
    }

    /// Check if the service is reachable with the configured credential
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1beta/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.api_key()?)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                StudySnapError::Generation(format!(
                    "Cannot reach Gemini at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(StudySnapError::Generation(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.api_key()?)
            .send()
            .await?;

        let models: ModelsResponse = response.json().await?;
        Ok(models
            .models
            .into_iter()
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }

    /// Check if a specific model is available
    pub async fn model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    /// Generate content from a text prompt and an inline image
    pub async fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(prompt.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: image_base64.to_string(),
                        }),
                    },
                ],
            }],
        };

        debug!("Sending vision request to Gemini: model={}", model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StudySnapError::Generation(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        let result: GenerateContentResponse = response.json().await?;
        result
            .text()
            .ok_or_else(|| StudySnapError::Generation("Response contained no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = GeminiClient::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            None,
            120,
        );
        assert_eq!(client.base_url, "https://generativelanguage.googleapis.com");
        assert!(!client.has_credential());
    }

    #[test]
    fn response_text_concatenates_first_candidate_parts() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "foo "}, {"text": "bar"}], "role": "model"}}
            ]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text().as_deref(), Some("foo bar"));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.text().is_none());
    }

    #[tokio::test]
    async fn missing_credential_is_a_config_error() {
        let client = GeminiClient::new("http://127.0.0.1:9", None, 5);
        match client.list_models().await {
            Err(StudySnapError::Config(_)) => {}
            other => panic!("Expected Config error, got {:?}", other),
        }
    }
}
