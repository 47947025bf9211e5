//! Warehouse schema catalog.
//!
//! A static description of every table the analyst may query, parsed from
//! an embedded TOML document at startup and read-only afterwards. The
//! catalog is the single source of truth for the referenced-table check and
//! for the schema listing injected into generation prompts.

use crate::error::{AnalystError, Result};
use serde::Deserialize;
use std::sync::Arc;

/// Embedded catalog document. Edit the data file, not this module.
const CATALOG_TOML: &str = include_str!("../data/catalog.toml");

/// Specification of a single column.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Data type (e.g., "bigint", "varchar", "timestamp").
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Description of one warehouse relation.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    /// Schema-qualified table name (e.g., "bi.companies").
    pub name: String,

    /// One-line description shown to the model.
    #[serde(default)]
    pub description: Option<String>,

    /// Ordered column list.
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Looks up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDoc {
    tables: Vec<TableSchema>,
}

/// The full warehouse catalog.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Arc<Vec<TableSchema>>,
}

impl SchemaCatalog {
    /// Loads the embedded catalog.
    pub fn load() -> Result<Self> {
        Self::from_toml(CATALOG_TOML)
    }

    /// Parses a catalog from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let doc: CatalogDoc = toml::from_str(content)
            .map_err(|e| AnalystError::config(format!("Invalid catalog document: {e}")))?;
        if doc.tables.is_empty() {
            return Err(AnalystError::config("Catalog document lists no tables"));
        }
        Ok(Self {
            tables: Arc::new(doc.tables),
        })
    }

    /// Returns every table in load order.
    pub fn describe(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Looks up a table by its qualified name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if the catalog contains the named table.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Formats the catalog for inclusion in a generation prompt.
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();
        for table in self.tables.iter() {
            out.push_str("Table: ");
            out.push_str(&table.name);
            if let Some(desc) = &table.description {
                out.push_str(" -- ");
                out.push_str(desc);
            }
            out.push('\n');
            for column in &table.columns {
                out.push_str("  - ");
                out.push_str(&column.name);
                out.push_str(": ");
                out.push_str(&column.data_type);
                if !column.nullable {
                    out.push_str(" (NOT NULL)");
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}
