//! Demo data provider.
//!
//! Synthesizes deterministic, schema-shaped, plainly fictitious rows when
//! the warehouse is unreachable. The generator parses the validated
//! statement to recover the primary table, the projected columns, the LIMIT
//! and any simple equality filters; filtered columns materialize the
//! literal so a query like `filing_state = 'CA'` comes back honored rather
//! than silently wrong.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlparser::ast::{
    BinaryOperator, Expr, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    Value as SqlValue,
};
use sqlparser::dialect::RedshiftSqlDialect;
use sqlparser::parser::Parser;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::catalog::{ColumnSpec, SchemaCatalog, TableSchema};
use crate::error::{AnalystError, Result};
use crate::exec::{ColumnInfo, ExecutionResult, QueryExecutor, ResultSource, Row, Value};

/// Rows synthesized when the statement carries no readable LIMIT.
const FALLBACK_ROWS: u64 = 10;

/// Deterministic synthetic result provider.
#[derive(Debug, Clone)]
pub struct DemoDataProvider {
    catalog: SchemaCatalog,
    /// Anchor for synthesized dates; injectable so tests are reproducible.
    base_date: NaiveDate,
}

impl DemoDataProvider {
    /// Creates a provider anchored at the given date.
    pub fn new(catalog: SchemaCatalog, base_date: NaiveDate) -> Self {
        Self { catalog, base_date }
    }

    /// Synthesizes a result set for a validated statement.
    pub fn synthesize(&self, validated_sql: &str) -> Result<ExecutionResult> {
        let shape = self.parse_shape(validated_sql)?;

        let columns: Vec<ColumnInfo> = shape
            .columns
            .iter()
            .map(|c| ColumnInfo::new(c.name.clone(), c.data_type.clone()))
            .collect();

        let rows: Vec<Row> = (0..shape.row_count)
            .map(|idx| {
                shape
                    .columns
                    .iter()
                    .map(|c| self.synthesize_value(&shape.table, c, idx))
                    .collect()
            })
            .collect();

        Ok(ExecutionResult::new(columns, rows, ResultSource::Demo))
    }

    /// Recovers table, projection, filters and LIMIT from the statement.
    fn parse_shape(&self, sql: &str) -> Result<ResultShape> {
        let statements = Parser::parse_sql(&RedshiftSqlDialect {}, sql)
            .map_err(|e| AnalystError::internal(format!("demo provider parse failure: {e}")))?;

        let query = match statements.first() {
            Some(Statement::Query(query)) => query,
            _ => {
                return Err(AnalystError::internal(
                    "demo provider expects a validated SELECT",
                ))
            }
        };

        let row_count = limit_of(query).unwrap_or(FALLBACK_ROWS);

        let mut select = innermost_select(query).ok_or_else(|| {
            AnalystError::internal("demo provider could not find a SELECT body")
        })?;

        let mut table_name = primary_table(select)
            .ok_or_else(|| AnalystError::internal("demo provider could not find a table"))?;

        // A statement selecting from a CTE is shaped by the CTE's own base
        // table.
        if let Some(with) = &query.with {
            if let Some(cte) = with
                .cte_tables
                .iter()
                .find(|cte| cte.alias.name.value.eq_ignore_ascii_case(&table_name))
            {
                if let Some(inner) = innermost_select(&cte.query) {
                    if let Some(inner_table) = primary_table(inner) {
                        select = inner;
                        table_name = inner_table;
                    }
                }
            }
        }
        let table = self
            .catalog
            .get(&table_name)
            .ok_or_else(|| AnalystError::unknown_table(table_name.clone()))?
            .clone();

        let filters = equality_filters(select);
        let columns = projected_columns(select, &table);

        Ok(ResultShape {
            table: table_name,
            columns: columns
                .into_iter()
                .map(|spec| ShapedColumn {
                    filter: filters.get(&spec.name.to_lowercase()).cloned(),
                    name: spec.name,
                    data_type: spec.data_type,
                })
                .collect(),
            row_count,
        })
    }

    /// Produces a deterministic value for (table, column, row index).
    fn synthesize_value(&self, table: &str, column: &ShapedColumn, idx: u64) -> Value {
        // A filtered column reflects the filter literal, so the synthetic
        // rows visibly honor the WHERE clause.
        if let Some(filter) = &column.filter {
            return filter.clone();
        }

        let seed = stable_seed(table, &column.name);
        match column.data_type.as_str() {
            "boolean" => Value::Bool((seed + idx) % 2 == 0),
            "bigint" => Value::Int((10_000 + seed % 90_000 + idx) as i64),
            "integer" => Value::Int((seed % 90 + idx % 10) as i64),
            t if t.starts_with("numeric") => {
                Value::Float(((seed % 500_000 + idx * 137) as f64) / 100.0)
            }
            "date" => {
                let day = self.base_date - Duration::days((idx % 90) as i64);
                Value::String(day.format("%Y-%m-%d").to_string())
            }
            "timestamp" => {
                let day = self.base_date - Duration::days((idx % 90) as i64);
                Value::String(format!("{} {:02}:00:00", day.format("%Y-%m-%d"), seed % 24))
            }
            _ => Value::String(format!("{}_{}", column.name, idx + 1)),
        }
    }
}

#[async_trait]
impl QueryExecutor for DemoDataProvider {
    async fn execute(&self, validated_sql: &str) -> Result<ExecutionResult> {
        self.synthesize(validated_sql)
    }
}

/// The shape a synthesized result must take.
#[derive(Debug)]
struct ResultShape {
    table: String,
    columns: Vec<ShapedColumn>,
    row_count: u64,
}

#[derive(Debug)]
struct ShapedColumn {
    name: String,
    data_type: String,
    /// Literal from a `column = literal` predicate, if one was found.
    filter: Option<Value>,
}

fn stable_seed(table: &str, column: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    table.hash(&mut hasher);
    column.hash(&mut hasher);
    hasher.finish() % 1_000_000
}

fn limit_of(query: &Query) -> Option<u64> {
    match &query.limit {
        Some(Expr::Value(SqlValue::Number(n, _))) => n.parse().ok(),
        _ => None,
    }
}

/// Finds the first SELECT body, descending through set operations and
/// nested queries.
fn innermost_select(query: &Query) -> Option<&Select> {
    fn from_set_expr(set_expr: &SetExpr) -> Option<&Select> {
        match set_expr {
            SetExpr::Select(select) => Some(select),
            SetExpr::Query(query) => innermost_select(query),
            SetExpr::SetOperation { left, .. } => from_set_expr(left),
            _ => None,
        }
    }
    from_set_expr(&query.body)
}

/// The first base table in the FROM clause.
fn primary_table(select: &Select) -> Option<String> {
    fn from_factor(factor: &TableFactor) -> Option<String> {
        match factor {
            TableFactor::Table { name, .. } => Some(
                name.0
                    .iter()
                    .map(|ident| ident.value.to_lowercase())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            TableFactor::Derived { subquery, .. } => {
                innermost_select(subquery).and_then(primary_table)
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => from_factor(&table_with_joins.relation),
            _ => None,
        }
    }
    select.from.first().and_then(|twj| from_factor(&twj.relation))
}

/// `column = literal` predicates from the WHERE clause, keyed by lowercased
/// unqualified column name.
fn equality_filters(select: &Select) -> HashMap<String, Value> {
    let mut filters = HashMap::new();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters);
    }
    filters
}

fn collect_filters(expr: &Expr, filters: &mut HashMap<String, Value>) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                collect_filters(left, filters);
                collect_filters(right, filters);
            }
            BinaryOperator::Eq => {
                if let (Some(column), Some(value)) = (column_name(left), literal_value(right)) {
                    filters.insert(column, value);
                }
            }
            _ => {}
        },
        Expr::Nested(inner) => collect_filters(inner, filters),
        _ => {}
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|p| p.value.to_lowercase()),
        _ => None,
    }
}

fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Value(SqlValue::SingleQuotedString(s)) => Some(Value::String(s.clone())),
        Expr::Value(SqlValue::Number(n, _)) => {
            if let Ok(int) = n.parse::<i64>() {
                Some(Value::Int(int))
            } else {
                n.parse::<f64>().ok().map(Value::Float)
            }
        }
        Expr::Value(SqlValue::Boolean(b)) => Some(Value::Bool(*b)),
        _ => None,
    }
}

/// Columns to materialize: the explicit projection where identifiable, the
/// whole table for `SELECT *`, and a text placeholder for expressions.
fn projected_columns(select: &Select, table: &TableSchema) -> Vec<ColumnSpec> {
    let mut columns = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                columns.extend(table.columns.iter().cloned());
            }
            SelectItem::UnnamedExpr(expr) => {
                columns.push(spec_for_expr(expr, None, table));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                columns.push(spec_for_expr(expr, Some(alias.value.clone()), table));
            }
        }
    }
    if columns.is_empty() {
        columns.extend(table.columns.iter().cloned());
    }
    columns
}

fn spec_for_expr(expr: &Expr, alias: Option<String>, table: &TableSchema) -> ColumnSpec {
    if let Some(name) = column_name(expr) {
        if let Some(spec) = table.column(&name) {
            let mut spec = spec.clone();
            if let Some(alias) = alias {
                spec.name = alias;
            }
            return spec;
        }
    }
    ColumnSpec {
        name: alias.unwrap_or_else(|| expr.to_string()),
        data_type: "varchar".to_string(),
        nullable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn provider() -> DemoDataProvider {
        DemoDataProvider::new(
            SchemaCatalog::load().unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
        )
    }

    #[test]
    fn test_synthesize_is_sized_to_limit() {
        let result = provider()
            .synthesize("SELECT id, name FROM bi.companies LIMIT 25")
            .unwrap();

        assert_eq!(result.row_count, 25);
        assert_eq!(result.rows.len(), 25);
        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.source, ResultSource::Demo);
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let sql = "SELECT id, name, filing_state FROM bi.companies LIMIT 10";
        let first = provider().synthesize(sql).unwrap();
        let second = provider().synthesize(sql).unwrap();

        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn test_equality_filter_materialized() {
        let result = provider()
            .synthesize("SELECT id, filing_state FROM bi.companies WHERE filing_state = 'CA' LIMIT 5")
            .unwrap();

        for row in &result.rows {
            assert_eq!(row[1], Value::String("CA".to_string()));
        }
    }

    #[test]
    fn test_qualified_filter_materialized() {
        let result = provider()
            .synthesize(
                "SELECT c.id, c.filing_state FROM bi.companies c WHERE c.filing_state = 'NY' LIMIT 3",
            )
            .unwrap();

        for row in &result.rows {
            assert_eq!(row[1], Value::String("NY".to_string()));
        }
    }

    #[test]
    fn test_boolean_filter_materialized() {
        let result = provider()
            .synthesize(
                "SELECT company_id, credit_loss_flag FROM bi_reporting.gusto_payments_and_losses \
                 WHERE credit_loss_flag = true LIMIT 4",
            )
            .unwrap();

        for row in &result.rows {
            assert_eq!(row[1], Value::Bool(true));
        }
    }

    #[test]
    fn test_wildcard_takes_table_shape() {
        let catalog = SchemaCatalog::load().unwrap();
        let expected = catalog.get("bi.information_requests").unwrap().columns.len();

        let result = provider()
            .synthesize("SELECT * FROM bi.information_requests LIMIT 2")
            .unwrap();

        assert_eq!(result.columns.len(), expected);
        assert_eq!(result.rows[0].len(), expected);
    }

    #[test]
    fn test_types_shape_values() {
        let result = provider()
            .synthesize("SELECT id, is_active, created_at FROM bi.companies LIMIT 3")
            .unwrap();

        for row in &result.rows {
            assert!(matches!(row[0], Value::Int(_)));
            assert!(matches!(row[1], Value::Bool(_)));
            match &row[2] {
                Value::String(ts) => assert!(ts.starts_with("202")),
                other => panic!("expected timestamp string, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_aliased_projection_keeps_alias_name() {
        let result = provider()
            .synthesize("SELECT name AS company_name FROM bi.companies LIMIT 2")
            .unwrap();

        assert_eq!(result.columns[0].name, "company_name");
    }

    #[test]
    fn test_cte_shaped_by_inner_table() {
        let result = provider()
            .synthesize(
                "WITH recent AS (SELECT id, name FROM bi.companies LIMIT 50) \
                 SELECT id, name FROM recent LIMIT 5",
            )
            .unwrap();

        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.columns[0].name, "id");
        assert!(matches!(result.rows[0][0], Value::Int(_)));
    }

    #[test]
    fn test_unknown_table_refused() {
        let err = provider()
            .synthesize("SELECT * FROM bi.unknown LIMIT 5")
            .unwrap_err();
        assert!(matches!(err, AnalystError::UnknownTable(_)));
    }

    #[test]
    fn test_non_select_refused() {
        let err = provider().synthesize("DELETE FROM bi.companies").unwrap_err();
        assert!(matches!(err, AnalystError::Internal(_)));
    }

    #[tokio::test]
    async fn test_executor_trait_marks_demo_source() {
        let provider = provider();
        let result = QueryExecutor::execute(&provider, "SELECT id FROM bi.companies LIMIT 1")
            .await
            .unwrap();
        assert_eq!(result.source, ResultSource::Demo);
    }
}
