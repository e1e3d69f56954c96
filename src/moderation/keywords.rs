//! Keyword-list moderation backend
//!
//! Screens output against a configured keyword list, case-insensitively.
//! On a hit the whole answer is replaced with the preset response.

use crate::moderation::{ModerationBackend, ModerationError};
use async_trait::async_trait;
use regex::RegexSet;

pub struct KeywordsBackend {
    matcher: RegexSet,
    preset_response: String,
}

impl KeywordsBackend {
    pub fn new(keywords: &[String], preset_response: String) -> Result<Self, ModerationError> {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| format!("(?i){}", regex::escape(k)))
            .collect();

        let matcher = RegexSet::new(&patterns).map_err(|e| ModerationError::InvalidRule {
            message: e.to_string(),
        })?;

        Ok(Self {
            matcher,
            preset_response,
        })
    }

    fn flagged(&self, text: &str) -> bool {
        !self.matcher.is_empty() && self.matcher.is_match(text)
    }
}

#[async_trait]
impl ModerationBackend for KeywordsBackend {
    async fn scan(&self, text: &str) -> Option<String> {
        self.flagged(text).then(|| self.preset_response.clone())
    }

    async fn moderate(&self, completion: &str) -> String {
        if self.flagged(completion) {
            self.preset_response.clone()
        } else {
            completion.to_string()
        }
    }
}
