//! Prompt construction for generation requests.
//!
//! Assembles the system framing, schema listing, matched business rules and
//! retrieved examples into a single request. Ordering is a contract: rules
//! are rendered before examples, so a stale example that contradicts a rule
//! sits further from the question than the rule itself. The post-generation
//! conformance check in the validator is the stronger backstop.

use chrono::NaiveDate;

use crate::catalog::SchemaCatalog;
use crate::error::{AnalystError, Result};
use crate::examples::ExampleStore;
use crate::llm::types::Message;
use crate::rules::BusinessRuleSet;

/// System framing template. `{schema}`, `{rules}` and `{examples}` are
/// substituted per request; the surrounding constraints are fixed.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a SQL analyst for the company data warehouse (Amazon Redshift). Generate SQL answering the user's question.

DATABASE SCHEMA:
{schema}
BUSINESS RULES (authoritative; they override any conflicting example):
{rules}
EXAMPLE VALIDATED QUERIES (learn from these patterns):
{examples}
INSTRUCTIONS:
- Generate exactly one read-only SELECT statement for Redshift
- Use ONLY the tables and columns listed in the schema, with schema-qualified names (e.g. bi.companies)
- Always end the query with a LIMIT clause (LIMIT 100 unless the user asks otherwise)
- Never generate INSERT, UPDATE, DELETE, DROP, ALTER or GRANT
- Never invent literal IDs, names or other values that are not present in the question; wildcards, booleans and date ranges are fine
- For time-based aggregations use DATE_TRUNC and ORDER BY the time column DESC

OUTPUT FORMAT:
Return the SQL query wrapped in ```sql code blocks."#;

/// Builds generation requests from the catalog, rule set and example store.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: SchemaCatalog,
    rules: BusinessRuleSet,
    examples: ExampleStore,
    /// How many examples to retrieve per question.
    example_count: usize,
}

impl PromptBuilder {
    /// Creates a builder, verifying that every table referenced by a
    /// business rule exists in the catalog. This runs once at startup so a
    /// catalog/rules drift is caught before any request is served.
    pub fn new(
        catalog: SchemaCatalog,
        rules: BusinessRuleSet,
        examples: ExampleStore,
    ) -> Result<Self> {
        for table in rules.referenced_tables() {
            if !catalog.contains(table) {
                return Err(AnalystError::SchemaMissing(format!(
                    "business rule references table '{table}' absent from the catalog"
                )));
            }
        }
        let example_count = examples.len();
        Ok(Self {
            catalog,
            rules,
            examples,
            example_count,
        })
    }

    /// Caps the number of retrieved examples per question.
    pub fn with_example_count(mut self, k: usize) -> Self {
        self.example_count = k;
        self
    }

    /// Builds the message list for a question. `today` anchors the
    /// fiscal-year placeholders so generation is reproducible in tests.
    pub fn build(&self, question: &str, today: NaiveDate) -> Vec<Message> {
        let rules_text = self.render_rules(question, today);
        let examples_text = self.render_examples(question);

        let system = SYSTEM_PROMPT_TEMPLATE
            .replace("{schema}", &self.catalog.format_for_prompt())
            .replace("{rules}", &rules_text)
            .replace("{examples}", &examples_text);

        vec![Message::system(system), Message::user(question.to_string())]
    }

    fn render_rules(&self, question: &str, today: NaiveDate) -> String {
        let matched = self.rules.applicable_rules(question);
        if matched.is_empty() {
            return "(no special rules apply to this question)\n".to_string();
        }
        let mut out = String::new();
        for rule in matched {
            out.push_str("- ");
            out.push_str(&rule.render_instruction(today));
            out.push('\n');
        }
        out
    }

    fn render_examples(&self, question: &str) -> String {
        let retrieved = self.examples.retrieve(question, self.example_count);
        if retrieved.is_empty() {
            return "(none)\n".to_string();
        }
        let mut out = String::new();
        for (idx, example) in retrieved.iter().enumerate() {
            out.push_str(&format!("{}. Question: \"{}\"\n", idx + 1, example.question));
            out.push_str("   SQL:\n");
            for line in example.sql.trim().lines() {
                out.push_str("   ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}
