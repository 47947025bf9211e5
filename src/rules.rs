//! Curated business rules.
//!
//! The warehouse has documented conventions (flag semantics, fiscal-year
//! boundaries, risk-state enumerations, mandated join keys) that a generated
//! query must follow. They live in an embedded TOML document so a wrong flag
//! mapping can be corrected without a rebuild, and are matched against the
//! question by a plain keyword table: deterministic and auditable, never a
//! learned classifier.

use crate::error::{AnalystError, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;

/// Embedded rules document. Edit the data file, not this module.
const RULES_TOML: &str = include_str!("../data/rules.toml");

/// A single codified domain rule.
#[derive(Debug, Clone, Deserialize)]
pub struct BusinessRule {
    /// Stable identifier, used in warnings.
    pub name: String,

    /// Keywords/topics that activate the rule, matched case-insensitively
    /// as substrings of the question.
    pub triggers: Vec<String>,

    /// Tables the rule constrains. Conformance is only checked when the
    /// statement references one of them. Empty = applies everywhere.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Text rendered into the prompt. May contain `{fy_label}`,
    /// `{fy_start}` and `{fy_end}` placeholders.
    pub instruction: String,

    /// Exact SQL fragment the rule mandates, if any.
    #[serde(default)]
    pub condition: Option<String>,
}

impl BusinessRule {
    /// Returns true if the question activates this rule. Multi-word and
    /// long triggers match as substrings; short triggers ("fy") match as
    /// whole tokens so they cannot fire inside unrelated words.
    pub fn matches(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        self.triggers.iter().any(|t| {
            let trigger = t.to_lowercase();
            if trigger.len() <= 3 {
                question
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .any(|token| token == trigger)
            } else {
                question.contains(&trigger)
            }
        })
    }

    /// Renders the instruction with fiscal-year placeholders resolved
    /// against `today`.
    pub fn render_instruction(&self, today: NaiveDate) -> String {
        render_fiscal_placeholders(&self.instruction, today)
    }
}

/// A mandated join key pair between two named tables.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRule {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

impl JoinRule {
    /// Returns true if this rule governs a join between the two tables,
    /// in either order.
    pub fn governs(&self, a: &str, b: &str) -> bool {
        (self.left_table.eq_ignore_ascii_case(a) && self.right_table.eq_ignore_ascii_case(b))
            || (self.left_table.eq_ignore_ascii_case(b)
                && self.right_table.eq_ignore_ascii_case(a))
    }

    /// Returns true if the equality `(ta.ca = tb.cb)` is the mandated pair.
    pub fn permits(&self, ta: &str, ca: &str, tb: &str, cb: &str) -> bool {
        let forward = self.left_table.eq_ignore_ascii_case(ta)
            && self.left_column.eq_ignore_ascii_case(ca)
            && self.right_table.eq_ignore_ascii_case(tb)
            && self.right_column.eq_ignore_ascii_case(cb);
        let backward = self.left_table.eq_ignore_ascii_case(tb)
            && self.left_column.eq_ignore_ascii_case(cb)
            && self.right_table.eq_ignore_ascii_case(ta)
            && self.right_column.eq_ignore_ascii_case(ca);
        forward || backward
    }
}

#[derive(Debug, Deserialize)]
struct RulesDoc {
    rules: Vec<BusinessRule>,
    #[serde(default)]
    joins: Vec<JoinRule>,
}

/// The full rule set, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BusinessRuleSet {
    rules: Arc<Vec<BusinessRule>>,
    joins: Arc<Vec<JoinRule>>,
}

impl BusinessRuleSet {
    /// Loads the embedded rule set.
    pub fn load() -> Result<Self> {
        Self::from_toml(RULES_TOML)
    }

    /// Parses a rule set from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let doc: RulesDoc = toml::from_str(content)
            .map_err(|e| AnalystError::config(format!("Invalid rules document: {e}")))?;
        Ok(Self {
            rules: Arc::new(doc.rules),
            joins: Arc::new(doc.joins),
        })
    }

    /// Returns every rule activated by the question. Rules are never
    /// mutually exclusive; all matches are included, in load order.
    pub fn applicable_rules(&self, question: &str) -> Vec<&BusinessRule> {
        self.rules.iter().filter(|r| r.matches(question)).collect()
    }

    /// All rules, in load order.
    pub fn all(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// All mandated join key pairs.
    pub fn join_rules(&self) -> &[JoinRule] {
        &self.joins
    }

    /// Every table name referenced by any rule (for the startup
    /// catalog-consistency check).
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self
            .rules
            .iter()
            .flat_map(|r| r.tables.iter().map(String::as_str))
            .chain(self.joins.iter().flat_map(|j| {
                [j.left_table.as_str(), j.right_table.as_str()]
            }))
            .collect();
        tables.sort_unstable();
        tables.dedup();
        tables
    }
}

/// Returns the half-open date interval of fiscal year `label`:
/// `[May 1 of label-1, May 1 of label)`.
pub fn fiscal_year(label: i32) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(label - 1, 5, 1).expect("May 1 always exists");
    let end = NaiveDate::from_ymd_opt(label, 5, 1).expect("May 1 always exists");
    (start, end)
}

/// Returns the label of the fiscal year containing `today`, using the same
/// May 1 boundary rule.
pub fn current_fiscal_year(today: NaiveDate) -> i32 {
    if today.month() >= 5 {
        today.year() + 1
    } else {
        today.year()
    }
}

/// Resolves `{fy_label}`, `{fy_start}` and `{fy_end}` in a rule instruction.
fn render_fiscal_placeholders(text: &str, today: NaiveDate) -> String {
    if !text.contains("{fy_") {
        return text.to_string();
    }
    let label = current_fiscal_year(today);
    let (start, end) = fiscal_year(label);
    text.replace("{fy_label}", &label.to_string())
        .replace("{fy_start}", &start.format("%Y-%m-%d").to_string())
        .replace("{fy_end}", &end.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_embedded_rules_load() {
        let rules = BusinessRuleSet::load().unwrap();
        assert!(!rules.all().is_empty());
        assert!(!rules.join_rules().is_empty());
    }

    #[test]
    fn test_fiscal_year_interval() {
        let (start, end) = fiscal_year(2024);
        assert_eq!(start, date(2023, 5, 1));
        assert_eq!(end, date(2024, 5, 1));
    }

    #[test]
    fn test_current_fiscal_year_boundaries() {
        // April 30 belongs to the closing fiscal year, May 1 opens the next.
        assert_eq!(current_fiscal_year(date(2024, 4, 30)), 2024);
        assert_eq!(current_fiscal_year(date(2024, 5, 1)), 2025);
        assert_eq!(current_fiscal_year(date(2024, 12, 31)), 2025);
        assert_eq!(current_fiscal_year(date(2025, 1, 1)), 2025);
    }

    #[test]
    fn test_fiscal_interval_contains_today() {
        let today = date(2026, 8, 7);
        let label = current_fiscal_year(today);
        let (start, end) = fiscal_year(label);
        assert!(start <= today && today < end);
    }

    #[test]
    fn test_credit_loss_trigger_matches() {
        let rules = BusinessRuleSet::load().unwrap();
        let matched = rules.applicable_rules("Show credit loss transactions over $1000");
        let names: Vec<&str> = matched.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"credit-loss-payments"));
        assert!(names.contains(&"credit-loss-delinquencies"));
        assert!(!names.contains(&"fraud-loss-payments"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let rules = BusinessRuleSet::load().unwrap();
        let matched = rules.applicable_rules("SHOW FRAUD COMPANIES FROM LAST WEEK");
        assert!(matched.iter().any(|r| r.name == "fraud-company-risk-states"));
    }

    #[test]
    fn test_multiple_rules_can_match() {
        let rules = BusinessRuleSet::load().unwrap();
        let matched = rules.applicable_rules("monthly credit loss volumes");
        let names: Vec<&str> = matched.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"credit-loss-payments"));
        assert!(names.contains(&"event-date-column"));
    }

    #[test]
    fn test_unrelated_question_matches_nothing() {
        let rules = BusinessRuleSet::load().unwrap();
        assert!(rules.applicable_rules("how many penalty cases were opened").is_empty());
    }

    #[test]
    fn test_short_trigger_needs_whole_token() {
        let rules = BusinessRuleSet::load().unwrap();
        // "verify" must not activate the "fy" trigger.
        assert!(!rules
            .applicable_rules("verify the penalty case totals")
            .iter()
            .any(|r| r.name == "fiscal-year"));
        assert!(rules
            .applicable_rules("net losses for FY 2024")
            .iter()
            .any(|r| r.name == "fiscal-year"));
    }

    #[test]
    fn test_risk_state_rule_carries_full_enumeration() {
        let rules = BusinessRuleSet::load().unwrap();
        let rule = rules
            .all()
            .iter()
            .find(|r| r.name == "fraud-company-risk-states")
            .unwrap();
        assert_eq!(
            rule.condition.as_deref(),
            Some("risk_state IN (2,3,7,9,12,13,14,15,17,20,22)")
        );
    }

    #[test]
    fn test_fiscal_rule_renders_placeholders() {
        let rules = BusinessRuleSet::load().unwrap();
        let rule = rules.all().iter().find(|r| r.name == "fiscal-year").unwrap();

        let rendered = rule.render_instruction(date(2024, 7, 15));
        assert!(rendered.contains("FY2025"));
        assert!(rendered.contains("'2024-05-01'"));
        assert!(rendered.contains("'2025-05-01'"));
        assert!(!rendered.contains("{fy_"));
    }

    #[test]
    fn test_join_rule_permits() {
        let rule = JoinRule {
            left_table: "bi.companies".into(),
            left_column: "id".into(),
            right_table: "bi.risk_onboarding".into(),
            right_column: "company_id".into(),
        };

        assert!(rule.governs("bi.risk_onboarding", "bi.companies"));
        assert!(rule.permits("bi.companies", "id", "bi.risk_onboarding", "company_id"));
        assert!(rule.permits("bi.risk_onboarding", "company_id", "bi.companies", "id"));
        assert!(!rule.permits("bi.companies", "uuid", "bi.risk_onboarding", "company_id"));
    }

    #[test]
    fn test_referenced_tables_deduplicated() {
        let rules = BusinessRuleSet::load().unwrap();
        let tables = rules.referenced_tables();
        let mut sorted = tables.clone();
        sorted.dedup();
        assert_eq!(tables.len(), sorted.len());
        assert!(tables.contains(&"bi.risk_onboarding"));
    }
}
