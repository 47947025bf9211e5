//! The SQL safety validator.
//!
//! Parses candidate SQL with the Redshift dialect and applies, in order:
//! single-statement and read-only checks (fatal), LIMIT bounding (silent,
//! recorded), business-rule and join-key conformance (advisory), and the
//! referenced-table check against the catalog (fatal).

use std::collections::{HashMap, HashSet};

use sqlparser::ast::{
    BinaryOperator, Expr, Join, JoinConstraint, Query, Select, SetExpr, Statement, TableFactor,
    TableWithJoins, Value as SqlValue,
};
use sqlparser::dialect::RedshiftSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::config::Limits;
use crate::error::{AnalystError, Result};
use crate::mode::Mode;
use crate::rules::BusinessRuleSet;
use crate::safety::GeneratedQuery;

/// SQL safety validator. Cheap to construct; holds shared read-only state.
#[derive(Debug, Clone)]
pub struct SqlSafetyValidator {
    catalog: SchemaCatalog,
    rules: BusinessRuleSet,
    limits: Limits,
}

impl SqlSafetyValidator {
    /// Creates a validator over the given catalog and rule set.
    pub fn new(catalog: SchemaCatalog, rules: BusinessRuleSet, limits: Limits) -> Self {
        Self {
            catalog,
            rules,
            limits,
        }
    }

    /// Validates a candidate statement, failing closed.
    ///
    /// `question` drives the advisory rule-conformance spot-check; `mode` is
    /// stamped onto the resulting [`GeneratedQuery`].
    pub fn validate(&self, raw_sql: &str, question: &str, mode: Mode) -> Result<GeneratedQuery> {
        let trimmed = raw_sql.trim();
        if trimmed.is_empty() {
            return Err(AnalystError::unsafe_statement("empty statement"));
        }

        // Quick multi-statement rejection before parsing: at most one
        // terminating semicolon is allowed.
        let inner = trimmed.strip_suffix(';').unwrap_or(trimmed);
        if inner.contains(';') {
            return Err(AnalystError::unsafe_statement(
                "multiple statements are not allowed",
            ));
        }

        let mut statements = Parser::parse_sql(&RedshiftSqlDialect {}, trimmed)
            .map_err(|e| AnalystError::unsafe_statement(format!("could not parse SQL: {e}")))?;

        if statements.len() != 1 {
            return Err(AnalystError::unsafe_statement(format!(
                "expected exactly one statement, found {}",
                statements.len()
            )));
        }

        let mut statement = statements.remove(0);
        let mut warnings = Vec::new();

        let scan = match &mut statement {
            Statement::Query(query) => {
                ensure_read_only_query(query)?;
                self.enforce_limit(query, &mut warnings);
                scan_query(query)
            }
            other => {
                return Err(AnalystError::unsafe_statement(format!(
                    "leading keyword {} is not allowed; only SELECT is",
                    statement_keyword(other)
                )));
            }
        };

        let validated_sql = statement.to_string();

        self.check_tables(&scan)?;
        self.check_rule_conformance(question, &validated_sql, &scan, &mut warnings);
        self.check_join_keys(&scan, &mut warnings);

        debug!(
            warnings = warnings.len(),
            tables = scan.tables.len(),
            "statement cleared by safety validator"
        );

        Ok(GeneratedQuery {
            raw_sql: raw_sql.to_string(),
            validated_sql,
            mode,
            warnings,
        })
    }

    /// Appends or clamps the LIMIT clause. Never rejects.
    fn enforce_limit(&self, query: &mut Query, warnings: &mut Vec<String>) {
        let default = self.limits.default_row_limit;
        let ceiling = self.limits.max_row_limit;

        let replacement = match &query.limit {
            None => {
                warnings.push(format!("no LIMIT clause; appended LIMIT {default}"));
                Some(default)
            }
            Some(Expr::Value(SqlValue::Number(n, _))) => match n.parse::<u64>() {
                Ok(v) if v > ceiling => {
                    warnings.push(format!("LIMIT {v} exceeds the ceiling; clamped to {ceiling}"));
                    Some(ceiling)
                }
                Ok(_) => None,
                Err(_) => {
                    warnings.push(format!(
                        "unreadable LIMIT value; replaced with LIMIT {default}"
                    ));
                    Some(default)
                }
            },
            Some(_) => {
                warnings.push(format!(
                    "non-numeric LIMIT expression; replaced with LIMIT {default}"
                ));
                Some(default)
            }
        };

        if let Some(value) = replacement {
            query.limit = Some(Expr::Value(SqlValue::Number(value.to_string(), false)));
        }
    }

    /// Every referenced table must exist in the catalog.
    fn check_tables(&self, scan: &QueryScan) -> Result<()> {
        for table in &scan.tables {
            if !self.catalog.contains(table) {
                return Err(AnalystError::unknown_table(table.clone()));
            }
        }
        Ok(())
    }

    /// Advisory spot-check: each applicable rule's condition fragment must
    /// appear (in normalized form) in the statement.
    fn check_rule_conformance(
        &self,
        question: &str,
        validated_sql: &str,
        scan: &QueryScan,
        warnings: &mut Vec<String>,
    ) {
        let normalized_sql = normalize(validated_sql);

        for rule in self.rules.applicable_rules(question) {
            let Some(condition) = &rule.condition else {
                continue;
            };
            if !rule.tables.is_empty() && !rule.tables.iter().any(|t| scan.references(t)) {
                continue;
            }
            if !normalized_sql.contains(&normalize(condition)) {
                warnings.push(format!(
                    "rule '{}' expects the statement to contain: {}",
                    rule.name, condition
                ));
            }
        }
    }

    /// Advisory check that joins between governed table pairs use the
    /// mandated key pair.
    fn check_join_keys(&self, scan: &QueryScan, warnings: &mut Vec<String>) {
        for rule in self.rules.join_rules() {
            let pair: Vec<&String> = scan
                .tables
                .iter()
                .filter(|t| {
                    rule.left_table.eq_ignore_ascii_case(t)
                        || rule.right_table.eq_ignore_ascii_case(t)
                })
                .collect();
            if pair.len() < 2 {
                continue;
            }

            let direct: Vec<&Equality> = scan
                .equalities
                .iter()
                .filter(|eq| rule.governs(&eq.left_table, &eq.right_table))
                .collect();
            if direct.is_empty() {
                continue;
            }

            let permitted = direct.iter().any(|eq| {
                rule.permits(
                    &eq.left_table,
                    &eq.left_column,
                    &eq.right_table,
                    &eq.right_column,
                )
            });
            if !permitted {
                warnings.push(format!(
                    "join between {} and {} should use {}.{} = {}.{}",
                    rule.left_table,
                    rule.right_table,
                    rule.left_table,
                    rule.left_column,
                    rule.right_table,
                    rule.right_column
                ));
            }
        }
    }
}

/// Lowercases and strips all whitespace, so fragment matching survives
/// formatting differences ("IN (2, 3)" vs "IN (2,3)").
fn normalize(sql: &str) -> String {
    sql.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Name of the leading keyword for rejection messages.
fn statement_keyword(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::Merge { .. } => "MERGE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => "ALTER",
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. } => "CREATE",
        Statement::Explain { .. } => "EXPLAIN",
        _ => "a non-SELECT statement",
    }
}

/// Rejects any data-modifying operation anywhere in the query, including
/// inside CTEs, set operations and derived tables.
fn ensure_read_only_query(query: &Query) -> Result<()> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            ensure_read_only_query(&cte.query)?;
        }
    }
    ensure_read_only_set_expr(&query.body)
}

fn ensure_read_only_set_expr(set_expr: &SetExpr) -> Result<()> {
    match set_expr {
        SetExpr::Select(select) => {
            for twj in &select.from {
                ensure_read_only_table_with_joins(twj)?;
            }
            Ok(())
        }
        SetExpr::Query(query) => ensure_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            ensure_read_only_set_expr(left)?;
            ensure_read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Insert(_) | SetExpr::Update(_) => {
            Err(AnalystError::unsafe_statement(
                "data-modifying operation inside a query",
            ))
        }
    }
}

fn ensure_read_only_table_with_joins(twj: &TableWithJoins) -> Result<()> {
    ensure_read_only_table_factor(&twj.relation)?;
    for join in &twj.joins {
        ensure_read_only_table_factor(&join.relation)?;
    }
    Ok(())
}

fn ensure_read_only_table_factor(factor: &TableFactor) -> Result<()> {
    match factor {
        TableFactor::Derived { subquery, .. } => ensure_read_only_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => ensure_read_only_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}

/// A resolved `a.x = b.y` predicate found in an ON clause or WHERE clause.
#[derive(Debug, Clone)]
struct Equality {
    left_table: String,
    left_column: String,
    right_table: String,
    right_column: String,
}

/// Tables and join predicates harvested from a query.
#[derive(Debug, Default)]
struct QueryScan {
    /// Referenced base tables (CTE names excluded), lowercased, deduplicated.
    tables: Vec<String>,
    /// Column equalities between two distinct tables.
    equalities: Vec<Equality>,
}

impl QueryScan {
    fn references(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }
}

/// Walks the query, resolving aliases and collecting base tables plus
/// cross-table equality predicates.
fn scan_query(query: &Query) -> QueryScan {
    let mut walker = Walker::default();
    walker.query(query);

    let mut tables: Vec<String> = walker
        .tables
        .into_iter()
        .filter(|t| !walker.cte_names.contains(t))
        .collect();
    tables.sort_unstable();
    tables.dedup();

    let equalities = walker
        .raw_equalities
        .iter()
        .filter_map(|(lq, lc, rq, rc)| {
            let left_table = walker.aliases.get(lq)?.clone();
            let right_table = walker.aliases.get(rq)?.clone();
            if left_table == right_table {
                return None;
            }
            Some(Equality {
                left_table,
                left_column: lc.clone(),
                right_table,
                right_column: rc.clone(),
            })
        })
        .collect();

    QueryScan { tables, equalities }
}

#[derive(Default)]
struct Walker {
    cte_names: HashSet<String>,
    tables: Vec<String>,
    /// qualifier (alias or table name, lowercased) -> base table name.
    aliases: HashMap<String, String>,
    /// (left qualifier, left column, right qualifier, right column).
    raw_equalities: Vec<(String, String, String, String)>,
}

impl Walker {
    fn query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte_names.insert(cte.alias.name.value.to_lowercase());
                self.query(&cte.query);
            }
        }
        self.set_expr(&query.body);
    }

    fn set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => self.select(select),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left);
                self.set_expr(right);
            }
            _ => {}
        }
    }

    fn select(&mut self, select: &Select) {
        for twj in &select.from {
            self.table_with_joins(twj);
        }
        if let Some(selection) = &select.selection {
            self.equalities_in(selection);
        }
    }

    fn table_with_joins(&mut self, twj: &TableWithJoins) {
        self.table_factor(&twj.relation);
        for join in &twj.joins {
            self.join(join);
        }
    }

    fn join(&mut self, join: &Join) {
        self.table_factor(&join.relation);
        if let Some(JoinConstraint::On(expr)) = join_constraint(join) {
            self.equalities_in(expr);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table: String = name
                    .0
                    .iter()
                    .map(|ident| ident.value.to_lowercase())
                    .collect::<Vec<_>>()
                    .join(".");
                if !self.cte_names.contains(&table) {
                    self.tables.push(table.clone());
                }
                // The table is addressable by its alias, its full name and
                // its unqualified name.
                if let Some(alias) = alias {
                    self.aliases
                        .insert(alias.name.value.to_lowercase(), table.clone());
                }
                if let Some(last) = table.rsplit('.').next() {
                    self.aliases.entry(last.to_string()).or_insert(table.clone());
                }
                self.aliases.insert(table.clone(), table);
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            _ => {}
        }
    }

    /// Collects `qualifier.column = qualifier.column` predicates from an
    /// expression tree, descending through AND chains and parentheses.
    fn equalities_in(&mut self, expr: &Expr) {
        match expr {
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => {
                    self.equalities_in(left);
                    self.equalities_in(right);
                }
                BinaryOperator::Eq => {
                    if let (Some((lq, lc)), Some((rq, rc))) =
                        (qualified_column(left), qualified_column(right))
                    {
                        self.raw_equalities.push((lq, lc, rq, rc));
                    }
                }
                _ => {}
            },
            Expr::Nested(inner) => self.equalities_in(inner),
            _ => {}
        }
    }
}

fn join_constraint(join: &Join) -> Option<&JoinConstraint> {
    use sqlparser::ast::JoinOperator::*;
    match &join.join_operator {
        Inner(c) | LeftOuter(c) | RightOuter(c) | FullOuter(c) => Some(c),
        _ => None,
    }
}

/// Splits `a.b.c` into (qualifier "a.b", column "c"), lowercased.
fn qualified_column(expr: &Expr) -> Option<(String, String)> {
    if let Expr::CompoundIdentifier(parts) = expr {
        if parts.len() >= 2 {
            let qualifier = parts[..parts.len() - 1]
                .iter()
                .map(|ident| ident.value.to_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            let column = parts[parts.len() - 1].value.to_lowercase();
            return Some((qualifier, column));
        }
    }
    None
}
