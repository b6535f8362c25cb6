//! Policy classification

use crate::config::PolicyConfig;
use crate::error::{ModerationError, Result};
use crate::types::PolicyMatch;
use regex::{Regex, RegexBuilder};

/// Decides whether a piece of text violates the content policy.
///
/// Implementations must be pure: the same text always yields the same
/// verdict and evaluation may run concurrently from many requests.
pub trait PolicyClassifier: Send + Sync {
    /// Evaluate text, returning match detail on a violation
    fn evaluate(&self, text: &str) -> Result<Option<PolicyMatch>>;

    /// Evaluate text, returning only the verdict
    fn classify(&self, text: &str) -> Result<bool> {
        Ok(self.evaluate(text)?.is_some())
    }
}

/// Blocklist classifier over literal terms and regular patterns
pub struct PatternClassifier {
    rules: Vec<Rule>,
}

struct Rule {
    source: String,
    regex: Regex,
}

impl PatternClassifier {
    /// Compile the policy's terms and patterns
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let terms = config.terms.iter().map(|term| regex::escape(term.trim()));
        let patterns = config.patterns.iter().cloned();

        let rules = terms
            .chain(patterns)
            .filter(|source| !source.is_empty())
            .map(|source| {
                let regex = RegexBuilder::new(&format!(r"\b(?:{})\b", source))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ModerationError::InvalidPattern {
                        pattern: source.clone(),
                        source: e,
                    })?;
                Ok(Rule { source, regex })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

impl PolicyClassifier for PatternClassifier {
    fn evaluate(&self, text: &str) -> Result<Option<PolicyMatch>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let found = self.rules.iter().find_map(|rule| {
            rule.regex.find(text).map(|m| PolicyMatch {
                pattern: rule.source.clone(),
                matched: m.as_str().to_string(),
                position: m.start(),
            })
        });

        Ok(found)
    }
}
