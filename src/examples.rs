//! Validated question/SQL examples for few-shot grounding.
//!
//! Each pair was confirmed correct against the live warehouse. Examples are
//! only rendered into prompts, never executed. Retrieval is deterministic:
//! the same question and k always produce the same examples, which keeps
//! generation reproducible for testing.

use crate::error::{AnalystError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Embedded examples document. Append new pairs to the data file.
const EXAMPLES_TOML: &str = include_str!("../data/examples.toml");

/// A manually validated natural-language/SQL pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatedExample {
    /// The natural-language question.
    pub question: String,

    /// The verified-correct statement.
    pub sql: String,
}

#[derive(Debug, Deserialize)]
struct ExamplesDoc {
    examples: Vec<ValidatedExample>,
}

/// Store of validated examples, ordered by addition.
#[derive(Debug, Clone)]
pub struct ExampleStore {
    examples: Arc<Vec<ValidatedExample>>,
}

impl ExampleStore {
    /// Loads the embedded example set.
    pub fn load() -> Result<Self> {
        Self::from_toml(EXAMPLES_TOML)
    }

    /// Parses an example set from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let doc: ExamplesDoc = toml::from_str(content)
            .map_err(|e| AnalystError::config(format!("Invalid examples document: {e}")))?;
        Ok(Self {
            examples: Arc::new(doc.examples),
        })
    }

    /// Number of stored examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Returns true if the store holds no examples.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// All examples in addition order.
    pub fn all(&self) -> &[ValidatedExample] {
        &self.examples
    }

    /// Returns up to `k` examples ranked by token overlap with the
    /// question. Ties break on addition order, so retrieval is fully
    /// deterministic. Examples with no overlap keep their addition order at
    /// the tail rather than being dropped: the model still benefits from
    /// seeing validated join and date patterns.
    pub fn retrieve(&self, question: &str, k: usize) -> Vec<&ValidatedExample> {
        let question_tokens = tokenize(question);

        let mut scored: Vec<(usize, usize, &ValidatedExample)> = self
            .examples
            .iter()
            .enumerate()
            .map(|(idx, example)| {
                let overlap = tokenize(&example.question)
                    .intersection(&question_tokens)
                    .count();
                (overlap, idx, example)
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, _, e)| e).collect()
    }
}

/// Lowercase alphanumeric tokens, minus words too common to discriminate.
fn tokenize(text: &str) -> HashSet<String> {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "of", "in", "for", "with", "to", "from", "me", "show", "get", "all",
        "list", "and", "or",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}
