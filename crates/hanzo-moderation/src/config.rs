//! Configuration for Hanzo Moderation

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration for the moderation pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModerationConfig {
    /// Content policy
    pub policy: PolicyConfig,
    /// Audit configuration
    pub audit: AuditConfig,
}

impl ModerationConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Content policy configuration
///
/// Terms and patterns are matched case-insensitively on whole-word boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Literal words or phrases to block
    pub terms: Vec<String>,
    /// Regular expressions to block
    pub patterns: Vec<String>,
    /// Message returned when the latest user turn is blocked
    pub input_block_message: String,
    /// Message returned when a completion is suppressed
    pub output_block_message: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            terms: vec![],
            patterns: vec![
                r"duck(y|ies?|s)?".to_string(),
                r"bunny|bunnies".to_string(),
                r"rabbits?".to_string(),
            ],
            input_block_message: "⚠️ BLOCKED: Your message mentions duckies or bunnies. \
                Discussions about cute animals may cause excessive happiness and distraction. \
                Please rephrase your question."
                .to_string(),
            output_block_message: "⚠️ BLOCKED: The response contains mentions of duckies or bunnies. \
                Discussions about cute animals may cause excessive happiness and distraction. \
                Please ask a different question."
                .to_string(),
        }
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit logging
    pub enabled: bool,
    /// Log (truncated) content alongside hashes
    pub log_content: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_content: false, // Privacy by default
        }
    }
}
