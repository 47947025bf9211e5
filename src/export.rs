//! Result rendering and export.
//!
//! CSV export for download and a plain-text table for terminal display.
//! Column order always matches the SELECT list; values render in a
//! locale-independent textual form, with NULL as an empty CSV field.

use std::io::Write;

use crate::error::{AnalystError, Result};
use crate::exec::{ExecutionResult, Value};

/// Writes the result as CSV to the given writer.
pub fn write_csv<W: Write>(result: &ExecutionResult, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(result.columns.iter().map(|c| c.name.as_str()))
        .map_err(|e| AnalystError::internal(format!("CSV header write failed: {e}")))?;

    for row in &result.rows {
        let fields: Vec<String> = row.iter().map(csv_field).collect();
        csv_writer
            .write_record(&fields)
            .map_err(|e| AnalystError::internal(format!("CSV row write failed: {e}")))?;
    }

    csv_writer
        .flush()
        .map_err(|e| AnalystError::internal(format!("CSV flush failed: {e}")))?;
    Ok(())
}

/// Serializes the result to a CSV string.
pub fn to_csv_string(result: &ExecutionResult) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(result, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| AnalystError::internal(format!("CSV was not UTF-8: {e}")))
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_display_string(),
    }
}

/// Renders the result as a fixed-width text table for terminal output.
pub fn render_table(result: &ExecutionResult) -> String {
    if result.columns.is_empty() {
        return "(no columns)\n".to_string();
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.name.len()).collect();
    let rendered_rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(Value::to_display_string).collect())
        .collect();

    for row in &rendered_rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx < widths.len() && cell.len() > widths[idx] {
                widths[idx] = cell.len();
            }
        }
    }

    let mut out = String::new();
    for (idx, column) in result.columns.iter().enumerate() {
        if idx > 0 {
            out.push_str(" | ");
        }
        out.push_str(&format!("{:<width$}", column.name, width = widths[idx]));
    }
    out.push('\n');

    let total: usize = widths.iter().sum::<usize>() + 3 * (widths.len() - 1);
    out.push_str(&"-".repeat(total));
    out.push('\n');

    for row in &rendered_rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx > 0 {
                out.push_str(" | ");
            }
            let width = widths.get(idx).copied().unwrap_or(cell.len());
            out.push_str(&format!("{cell:<width$}"));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ColumnInfo, ResultSource};
    use pretty_assertions::assert_eq;

    fn sample_result() -> ExecutionResult {
        ExecutionResult::new(
            vec![
                ColumnInfo::new("id", "bigint"),
                ColumnInfo::new("name", "varchar"),
                ColumnInfo::new("filing_state", "varchar"),
            ],
            vec![
                vec![Value::Int(1), Value::from("Acme Payroll"), Value::from("CA")],
                vec![Value::Int(2), Value::Null, Value::from("NY")],
            ],
            ResultSource::Live,
        )
    }

    #[test]
    fn test_csv_header_matches_select_order() {
        let csv = to_csv_string(&sample_result()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "id,name,filing_state");
    }

    #[test]
    fn test_csv_rows_rendered() {
        let csv = to_csv_string(&sample_result()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,Acme Payroll,CA");
    }

    #[test]
    fn test_csv_null_is_empty_field() {
        let csv = to_csv_string(&sample_result()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[2], "2,,NY");
    }

    #[test]
    fn test_csv_quotes_fields_with_commas() {
        let result = ExecutionResult::new(
            vec![ColumnInfo::new("name", "varchar")],
            vec![vec![Value::from("Acme, Inc.")]],
            ResultSource::Demo,
        );
        let csv = to_csv_string(&result).unwrap();
        assert!(csv.contains("\"Acme, Inc.\""));
    }

    #[test]
    fn test_csv_empty_result_has_header_only() {
        let result = ExecutionResult::new(
            vec![ColumnInfo::new("id", "bigint")],
            vec![],
            ResultSource::Live,
        );
        let csv = to_csv_string(&result).unwrap();
        assert_eq!(csv.trim(), "id");
    }

    #[test]
    fn test_table_contains_all_cells() {
        let table = render_table(&sample_result());
        assert!(table.contains("id"));
        assert!(table.contains("Acme Payroll"));
        assert!(table.contains("NULL"));
        assert!(table.contains("NY"));
    }

    #[test]
    fn test_table_handles_empty_columns() {
        let result = ExecutionResult::new(vec![], vec![], ResultSource::Demo);
        assert_eq!(render_table(&result), "(no columns)\n");
    }
}
