//! Per-request question answering state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a request in the answer pipeline.
///
/// `Start → Routed → (Retrieved) → Answered → End`, one linear pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Routed,
    Retrieved,
    Answered,
    End,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Routed => "routed",
            Stage::Retrieved => "retrieved",
            Stage::Answered => "answered",
            Stage::End => "end",
        };
        f.write_str(name)
    }
}

/// State threaded through the pipeline.
///
/// Each transition consumes the state and returns the next one; nothing is
/// shared between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    pub question: String,
    pub needs_retrieval: bool,
    /// Retrieved chunk texts, most relevant first.
    pub context: Vec<String>,
    pub answer: String,
    pub stage: Stage,
}

impl QueryState {
    pub fn start(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            needs_retrieval: false,
            context: Vec::new(),
            answer: String::new(),
            stage: Stage::Start,
        }
    }

    #[must_use]
    pub fn routed(self, needs_retrieval: bool) -> Self {
        Self {
            needs_retrieval,
            stage: Stage::Routed,
            ..self
        }
    }

    #[must_use]
    pub fn retrieved(self, context: Vec<String>) -> Self {
        Self {
            context,
            stage: Stage::Retrieved,
            ..self
        }
    }

    #[must_use]
    pub fn answered(self, answer: String) -> Self {
        Self {
            answer,
            stage: Stage::Answered,
            ..self
        }
    }

    #[must_use]
    pub fn finished(self) -> Self {
        Self {
            stage: Stage::End,
            ..self
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage == Stage::End
    }
}

/// Question submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

/// Final answer returned by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    /// Retrieved chunk texts, most relevant first.
    pub context: Vec<String>,
}

impl From<QueryState> for AskResponse {
    fn from(state: QueryState) -> Self {
        Self {
            question: state.question,
            answer: state.answer,
            context: state.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_state_is_empty() {
        let state = QueryState::start("what is the policy?");
        assert_eq!(state.stage, Stage::Start);
        assert!(state.context.is_empty());
        assert!(state.answer.is_empty());
        assert!(!state.needs_retrieval);
    }

    #[test]
    fn test_transitions_replace_state() {
        let state = QueryState::start("q")
            .routed(true)
            .retrieved(vec!["a".to_string()])
            .answered("a".to_string())
            .finished();

        assert!(state.is_terminal());
        assert!(state.needs_retrieval);
        assert_eq!(state.context, vec!["a"]);

        let response = AskResponse::from(state);
        assert_eq!(response.question, "q");
        assert_eq!(response.answer, "a");
    }

    #[test]
    fn test_response_serializes_contract_fields() {
        let response = AskResponse {
            question: "q".to_string(),
            answer: "a".to_string(),
            context: vec!["c".to_string()],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question": "q", "answer": "a", "context": ["c"]})
        );
    }
}
