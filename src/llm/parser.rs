//! Response parsing for model outputs.
//!
//! The model is asked to return SQL inside a ```sql code block, but real
//! responses also arrive as bare statements, generic code fences, or prose
//! with a trailing query. Everything here is about recovering the single
//! candidate statement before validation; the validator, not this module,
//! decides whether it is safe.

use regex::Regex;
use std::sync::OnceLock;

/// Matches a fenced code block, optionally tagged with a language.
fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```\s*([a-zA-Z]*)\s*\n(.*?)```").expect("static regex compiles")
    })
}

/// Extracts the candidate SQL statement from a raw model response.
///
/// Preference order:
/// 1. the first ```sql fenced block,
/// 2. the first generic fenced block,
/// 3. the response itself from the first SELECT/WITH keyword, if any.
///
/// Returns `None` when nothing statement-shaped is present (e.g. the model
/// answered with prose only).
pub fn extract_sql(response: &str) -> Option<String> {
    let mut generic_block: Option<String> = None;

    for caps in fence_re().captures_iter(response) {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if body.is_empty() {
            continue;
        }
        if lang.eq_ignore_ascii_case("sql") {
            return Some(strip_label(body));
        }
        if lang.is_empty() && generic_block.is_none() {
            generic_block = Some(strip_label(body));
        }
    }

    if let Some(block) = generic_block {
        return Some(block);
    }

    bare_statement(response)
}

/// Matches the start of an unfenced statement.
fn bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:select|with)\s").expect("static regex compiles"))
}

/// Drops a leading "SQL:"-style label some models prepend inside the fence.
fn strip_label(block: &str) -> String {
    let trimmed = block.trim();
    match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sql:") => trimmed[4..].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Finds an unfenced statement: the text from the first SELECT or WITH
/// keyword to the end of the response (or the first blank line after it).
fn bare_statement(response: &str) -> Option<String> {
    let found = bare_re().find(response)?;
    let candidate = &response[found.start()..];
    // Prose commonly follows after a blank line; stop there.
    let end = candidate.find("\n\n").unwrap_or(candidate.len());
    let statement = candidate[..end].trim();
    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_sql_fenced_block() {
        let response = "Here's the query:\n\n```sql\nSELECT * FROM bi.companies LIMIT 100;\n```\n\nThis returns every company.";
        assert_eq!(
            extract_sql(response),
            Some("SELECT * FROM bi.companies LIMIT 100;".to_string())
        );
    }

    #[test]
    fn test_extract_generic_fenced_block() {
        let response = "```\nSELECT COUNT(*) FROM bi.nacha_entries LIMIT 10;\n```";
        assert_eq!(
            extract_sql(response),
            Some("SELECT COUNT(*) FROM bi.nacha_entries LIMIT 10;".to_string())
        );
    }

    #[test]
    fn test_sql_block_preferred_over_generic() {
        let response = "```\nnot really sql\n```\n\n```sql\nSELECT 1;\n```";
        assert_eq!(extract_sql(response), Some("SELECT 1;".to_string()));
    }

    #[test]
    fn test_multiple_sql_blocks_uses_first() {
        let response = "```sql\nSELECT 1;\n```\nor\n```sql\nSELECT 2;\n```";
        assert_eq!(extract_sql(response), Some("SELECT 1;".to_string()));
    }

    #[test]
    fn test_bare_statement_without_fences() {
        let response = "SELECT id, name FROM bi.companies WHERE filing_state = 'CA' LIMIT 100;";
        assert_eq!(extract_sql(response), Some(response.to_string()));
    }

    #[test]
    fn test_bare_statement_after_prose() {
        let response = "Sure, here you go: SELECT id FROM bi.companies LIMIT 5;";
        assert_eq!(
            extract_sql(response),
            Some("SELECT id FROM bi.companies LIMIT 5;".to_string())
        );
    }

    #[test]
    fn test_bare_statement_stops_at_blank_line() {
        let response = "SELECT id FROM bi.companies LIMIT 5;\n\nLet me know if you need more.";
        assert_eq!(
            extract_sql(response),
            Some("SELECT id FROM bi.companies LIMIT 5;".to_string())
        );
    }

    #[test]
    fn test_cte_detected_without_fences() {
        let response = "WITH recent AS (SELECT * FROM bi.companies) SELECT * FROM recent LIMIT 10";
        assert!(extract_sql(response).unwrap().starts_with("WITH recent"));
    }

    #[test]
    fn test_prose_only_returns_none() {
        assert_eq!(extract_sql("I cannot answer that from the schema."), None);
        assert_eq!(extract_sql(""), None);
    }

    #[test]
    fn test_label_inside_fence_stripped() {
        let response = "```sql\nSQL: SELECT 1;\n```";
        assert_eq!(extract_sql(response), Some("SELECT 1;".to_string()));
    }

    #[test]
    fn test_other_language_block_ignored() {
        let response = "```python\nprint('hello')\n```";
        assert_eq!(extract_sql(response), None);
    }

    #[test]
    fn test_multiline_statement_preserved() {
        let response = "```sql\nSELECT c.id,\n       c.name\nFROM bi.companies c\nLIMIT 100;\n```";
        let sql = extract_sql(response).unwrap();
        assert!(sql.contains("c.name"));
        assert!(sql.contains("LIMIT 100"));
    }
}
