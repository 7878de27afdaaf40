//! Decides whether a question needs document retrieval.

use std::sync::Arc;

use crate::models::{RouterConfig, RouterMode, default_keywords};

pub trait Classifier: Send + Sync {
    fn needs_retrieval(&self, question: &str) -> bool;
}

/// Case-insensitive substring match against a keyword list.
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    keywords: Vec<String>,
}

impl KeywordRouter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordRouter {
    fn default() -> Self {
        Self::new(default_keywords())
    }
}

impl Classifier for KeywordRouter {
    fn needs_retrieval(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        self.keywords.iter().any(|k| question.contains(k.as_str()))
    }
}

/// Routes every question to retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetrieve;

impl Classifier for AlwaysRetrieve {
    fn needs_retrieval(&self, _question: &str) -> bool {
        true
    }
}

pub fn classifier_from_config(config: &RouterConfig) -> Arc<dyn Classifier> {
    match config.mode {
        RouterMode::Keywords => Arc::new(KeywordRouter::new(&config.keywords)),
        RouterMode::Always => Arc::new(AlwaysRetrieve),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keywords() {
        let router = KeywordRouter::default();
        assert!(router.needs_retrieval("What is the objective of the project?"));
        assert!(router.needs_retrieval("Please EXPLAIN the refund Policy"));
        assert!(router.needs_retrieval("please describe the policy"));
        assert!(!router.needs_retrieval("hello there"));
        assert!(!router.needs_retrieval(""));
    }

    #[test]
    fn test_substring_match() {
        let router = KeywordRouter::default();
        // "files" contains "file"
        assert!(router.needs_retrieval("which files are there"));
    }

    #[test]
    fn test_custom_keywords() {
        let router = KeywordRouter::new(["Invoice", "  ", "total"]);
        assert_eq!(router.keywords(), ["invoice", "total"]);
        assert!(router.needs_retrieval("what is the invoice total?"));
        assert!(!router.needs_retrieval("explain the document"));
    }

    #[test]
    fn test_from_config() {
        let always = RouterConfig {
            mode: RouterMode::Always,
            ..Default::default()
        };
        assert!(classifier_from_config(&always).needs_retrieval("hi"));
        assert!(!classifier_from_config(&RouterConfig::default()).needs_retrieval("hi"));
    }
}
