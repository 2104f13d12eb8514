// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for StudySnap

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Capture directories watched for new note photos
    #[serde(default)]
    pub watch_paths: Vec<String>,

    /// AI engine configuration
    pub ai_engine: EngineConfig,

    /// Prompt templates
    pub prompts: PromptConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Base URL of the Generative Language API
    pub url: String,

    /// Multimodal model used for note analysis
    pub model: String,

    /// API key; falls back to the GEMINI_API_KEY environment variable.
    /// When neither is set the generator runs in demo mode.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    /// Instruction sent alongside every captured image
    #[serde(default = "default_study_prompt")]
    pub study: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// SQLite database file holding the scan history
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Key the serialized history blob is stored under
    #[serde(default = "default_history_key")]
    pub history_key: String,
}

// Default value functions
fn default_timeout() -> u64 { 120 }
fn default_db_path() -> String { "studysnap.db".to_string() }
fn default_history_key() -> String { "studysnap_history".to_string() }

fn default_study_prompt() -> String {
    "You are an expert study assistant. Analyze this image of study notes. \
     Provide the following in JSON format: \
     1. \"explanation\": A clear, simple explanation of the concepts found. \
     2. \"summary\": A concise summary (max 3 bullet points). \
     3. \"quiz\": An array of 3 multiple choice questions with \"question\", \
     \"options\" (array of 4 strings), and \"answer\" (index 0-3). \
     Response must be valid JSON only, no markdown formatting.".to_string()
}

impl EngineConfig {
    /// Resolve the API credential: config value first, environment second.
    /// Empty strings count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_paths: vec!["./captures".to_string()],
            ai_engine: EngineConfig {
                url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-1.5-flash".to_string(),
                api_key: None,
                timeout_secs: default_timeout(),
            },
            prompts: PromptConfig {
                study: default_study_prompt(),
            },
            storage: StorageConfig::default(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            study: default_study_prompt(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            history_key: default_history_key(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::StudySnapError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_gemini() {
        let config = AppConfig::default();
        assert_eq!(config.ai_engine.url, "https://generativelanguage.googleapis.com");
        assert_eq!(config.ai_engine.model, "gemini-1.5-flash");
        assert_eq!(config.storage.history_key, "studysnap_history");
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/studysnap-config.json")).unwrap();
        assert_eq!(config.storage.path, "studysnap.db");
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.ai_engine.model = "gemini-1.5-pro".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.ai_engine.model, "gemini-1.5-pro");
        assert_eq!(loaded.prompts.study, config.prompts.study);
    }

    #[test]
    fn blank_api_key_counts_as_unset() {
        let mut engine = AppConfig::default().ai_engine;
        engine.api_key = Some("   ".to_string());
        // Only meaningful when the environment doesn't provide a key either
        if std::env::var("GEMINI_API_KEY").is_err() {
            assert!(engine.resolve_api_key().is_none());
        }

        engine.api_key = Some("test-key".to_string());
        assert_eq!(engine.resolve_api_key().as_deref(), Some("test-key"));
    }
}
