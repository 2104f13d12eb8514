// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Study-material generation from captured note images

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::{Result, StudySnapError};

/// One multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`
    pub answer: usize,
}

/// Structured study material extracted from one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyMaterial {
    pub explanation: String,
    pub summary: Vec<String>,
    pub quiz: Vec<QuizQuestion>,
}

impl StudyMaterial {
    /// Check the quiz invariant: every answer index must be in bounds.
    ///
    /// The prompt asks for 3 questions with 4 options each, but that shape
    /// is not enforced; replies with fewer questions or options still pass.
    pub fn validate(&self) -> Result<()> {
        for (i, q) in self.quiz.iter().enumerate() {
            if q.options.is_empty() {
                return Err(StudySnapError::Validation(format!(
                    "Question {} has no options",
                    i + 1
                )));
            }
            if q.answer >= q.options.len() {
                return Err(StudySnapError::Validation(format!(
                    "Question {} answer index {} out of range ({} options)",
                    i + 1,
                    q.answer,
                    q.options.len()
                )));
            }
        }
        Ok(())
    }
}

/// Trait for study-material generators
#[async_trait]
pub trait MaterialGenerator: Send + Sync {
    /// Turn one captured image into study material
    async fn generate(&self, image: &Path) -> Result<StudyMaterial>;
}

/// Generator backed by the Gemini multimodal API
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
    prompt: String,
}

impl GeminiGenerator {
    /// Build a generator from the application configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let engine = &config.ai_engine;
        let client = GeminiClient::new(
            &engine.url,
            engine.resolve_api_key(),
            engine.timeout_secs,
        );

        Self {
            client,
            model: engine.model.clone(),
            prompt: config.prompts.study.clone(),
        }
    }

    /// Whether a service credential is configured (demo mode otherwise)
    pub fn has_credential(&self) -> bool {
        self.client.has_credential()
    }

    /// Convert an image to base64 without re-encoding
    fn encode_image(path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;
        Ok(general_purpose::STANDARD.encode(&data))
    }

    /// Resize large captures and re-encode as JPEG for the API
    fn prepare_image(path: &Path) -> Result<Vec<u8>> {
        let img = image::open(path)?;

        // Resize if too large (max 1024px on longest side)
        let img = if img.width() > 1024 || img.height() > 1024 {
            img.resize(1024, 1024, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        img.write_to(&mut cursor, image::ImageFormat::Jpeg)?;

        Ok(buffer)
    }
}

#[async_trait]
impl MaterialGenerator for GeminiGenerator {
    async fn generate(&self, image: &Path) -> Result<StudyMaterial> {
        if !self.client.has_credential() {
            warn!("No API key configured, returning demo study material");
            return Ok(fallback_material());
        }

        let image_data = match Self::prepare_image(image) {
            Ok(data) => general_purpose::STANDARD.encode(&data),
            Err(_) => Self::encode_image(image)?, // Fallback to raw bytes
        };

        debug!("Requesting study material for {:?}", image);

        let reply = self
            .client
            .generate_with_image(&self.model, &self.prompt, &image_data, "image/jpeg")
            .await?;

        parse_material(&reply)
    }
}

/// Parse a raw model reply into validated study material
pub fn parse_material(raw: &str) -> Result<StudyMaterial> {
    let material: StudyMaterial = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| StudySnapError::Generation(format!("Reply was not valid JSON: {}", e)))?;
    material.validate()?;
    Ok(material)
}

/// Strip leading/trailing Markdown code fences from a model reply.
/// Unfenced input passes through unchanged.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

/// Fixed demo material used when no credential is configured
pub fn fallback_material() -> StudyMaterial {
    StudyMaterial {
        explanation: "Photosynthesis is the process used by plants, algae and certain \
                      bacteria to harness energy from sunlight and turn it into chemical \
                      energy."
            .to_string(),
        summary: vec![
            "Converts light energy to chemical energy.".to_string(),
            "Occurs in chloroplasts.".to_string(),
            "Produces glucose and oxygen.".to_string(),
        ],
        quiz: vec![
            QuizQuestion {
                question: "Where does photosynthesis occur?".to_string(),
                options: vec![
                    "Mitochondria".to_string(),
                    "Chloroplasts".to_string(),
                    "Nucleus".to_string(),
                    "Ribosomes".to_string(),
                ],
                answer: 1,
            },
            QuizQuestion {
                question: "What is the primary output of photosynthesis?".to_string(),
                options: vec![
                    "Carbon Dioxide".to_string(),
                    "Water".to_string(),
                    "Glucose".to_string(),
                    "Nitrogen".to_string(),
                ],
                answer: 2,
            },
            QuizQuestion {
                question: "Which pigment absorbs light energy?".to_string(),
                options: vec![
                    "Hemoglobin".to_string(),
                    "Chlorophyll".to_string(),
                    "Melanin".to_string(),
                    "Carotene".to_string(),
                ],
                answer: 1,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn strips_fences_with_language_tag() {
        let raw = "```json\n{\"explanation\":\"x\",\"summary\":[],\"quiz\":[]}\n```";
        let material = parse_material(raw).unwrap();
        assert_eq!(material.explanation, "x");
        assert!(material.summary.is_empty());
        assert!(material.quiz.is_empty());
    }

    #[test]
    fn strips_bare_fences() {
        let raw = "```\n{\"explanation\":\"y\",\"summary\":[\"a\"],\"quiz\":[]}\n```";
        let material = parse_material(raw).unwrap();
        assert_eq!(material.explanation, "y");
        assert_eq!(material.summary, vec!["a"]);
    }

    #[test]
    fn fence_stripping_is_idempotent() {
        let unfenced = "{\"explanation\":\"x\"}";
        assert_eq!(strip_code_fences(unfenced), unfenced);

        let fenced = "```json\n{\"a\":1}\n```";
        let once = strip_code_fences(fenced);
        assert_eq!(strip_code_fences(once), once);
    }

    #[test]
    fn garbage_reply_is_a_generation_error() {
        match parse_material("I could not read the image, sorry!") {
            Err(StudySnapError::Generation(_)) => {}
            other => panic!("Expected Generation error, got {:?}", other),
        }
    }

    #[test]
    fn out_of_bounds_answer_fails_validation() {
        let raw = r#"{
            "explanation": "e",
            "summary": [],
            "quiz": [{"question": "q", "options": ["a", "b"], "answer": 2}]
        }"#;
        match parse_material(raw) {
            Err(StudySnapError::Validation(_)) => {}
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn empty_options_fail_validation() {
        let raw = r#"{
            "explanation": "e",
            "summary": [],
            "quiz": [{"question": "q", "options": [], "answer": 0}]
        }"#;
        assert!(matches!(
            parse_material(raw),
            Err(StudySnapError::Validation(_))
        ));
    }

    #[test]
    fn in_bounds_quiz_passes_validation() {
        let raw = r#"{
            "explanation": "e",
            "summary": ["s1", "s2"],
            "quiz": [{"question": "q", "options": ["a", "b", "c", "d"], "answer": 3}]
        }"#;
        let material = parse_material(raw).unwrap();
        assert_eq!(material.quiz[0].answer, 3);
    }

    #[test]
    fn fallback_material_is_valid() {
        let material = fallback_material();
        assert!(material.validate().is_ok());
        assert_eq!(material.quiz.len(), 3);
        assert!(material.quiz.iter().all(|q| q.options.len() == 4));
    }

    #[tokio::test]
    async fn no_credential_returns_fallback_verbatim() {
        let mut config = AppConfig::default();
        config.ai_engine.api_key = None;
        // Shield the test from a key in the environment
        if std::env::var("GEMINI_API_KEY").is_ok() {
            return;
        }

        let generator = GeminiGenerator::from_config(&config);
        let material = generator
            .generate(Path::new("/nonexistent/notes.jpg"))
            .await
            .unwrap();
        assert_eq!(material, fallback_material());
    }

    #[tokio::test]
    async fn unreachable_service_is_an_error() {
        let mut config = AppConfig::default();
        config.ai_engine.url = "http://127.0.0.1:9".to_string();
        config.ai_engine.api_key = Some("test-key".to_string());
        config.ai_engine.timeout_secs = 2;

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("notes.jpg");
        // Not a decodable image; the generator falls back to raw bytes
        std::fs::write(&image_path, b"not really a jpeg").unwrap();

        let generator = GeminiGenerator::from_config(&config);
        assert!(generator.generate(&image_path).await.is_err());
    }
}
