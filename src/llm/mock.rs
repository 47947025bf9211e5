//! Mock language model client for testing.
//!
//! Returns canned warehouse queries based on input patterns, so the whole
//! pipeline can run hermetically.

use async_trait::async_trait;

use crate::error::{AnalystError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client with deterministic responses.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked first.
    custom_responses: Vec<(String, String)>,
    /// When set, every call fails with ServiceUnavailable.
    unavailable: bool,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping. When the last user message contains
    /// `pattern` (case-insensitively), the mock returns `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail, for downgrade-path tests.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("credit loss") {
            return "```sql\nSELECT company_id, event_id, event_debit_date, event_gross_amount, net_loss_amount\nFROM bi_reporting.gusto_payments_and_losses\nWHERE credit_loss_flag = true\nORDER BY event_debit_date DESC\nLIMIT 100;\n```".to_string();
        }

        if input_lower.contains("fraud compan") {
            return "```sql\nSELECT c.id, c.name, ro.risk_state\nFROM bi.companies c\nJOIN bi.risk_onboarding ro ON c.id = ro.company_id\nWHERE ro.risk_state IN (2,3,7,9,12,13,14,15,17,20,22)\nLIMIT 100;\n```".to_string();
        }

        if input_lower.contains("california") || input_lower.contains(" ca") {
            return "```sql\nSELECT id, name, filing_state, created_at\nFROM bi.companies\nWHERE filing_state = 'CA'\nLIMIT 100;\n```".to_string();
        }

        if input_lower.contains("compan") {
            return "```sql\nSELECT id, name, filing_state, created_at\nFROM bi.companies\nORDER BY created_at DESC\nLIMIT 100;\n```".to_string();
        }

        if input_lower.contains("employee") {
            return "```sql\nSELECT id, name, department_name, work_state\nFROM bi.gusto_employees\nLIMIT 100;\n```".to_string();
        }

        "I could not map that question to the warehouse schema.".to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        if self.unavailable {
            return Err(AnalystError::unavailable("mock model offline"));
        }
        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
