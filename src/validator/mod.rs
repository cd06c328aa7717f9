//! Query Validation for Read-Only Operations
//!
//! sqlgate only ever executes pure reads. Every query is parsed under the target
//! engine's dialect and checked structurally before a connection is opened.
//!
//! # Validation Strategy
//! - Parse with `sqlparser` using the dialect the engine adapter declares
//! - Exactly one statement, and it must be a query (`SELECT`, optionally behind `WITH`)
//! - The whole tree is walked: a statement nested anywhere inside the query
//!   (`INSERT` in a CTE, `DELETE` in a subquery, ...) rejects it, as does `SELECT ... INTO`
//! - Input the parser refuses is scanned for a write keyword opening a statement or a
//!   parenthesized body; one found there is a disallowed statement, not a syntax error
//! - Rejections carry a display-ready reason, never parser internals
//!
//! # Row Bounding
//! [`bound_query`] attaches `LIMIT n` when the statement carries no row limit anywhere.
//! It never fails: SQL the parser cannot handle is bounded textually instead.

use std::ops::ControlFlow;
use std::sync::Arc;

use sqlparser::ast::{Expr, Query, SetExpr, Statement, Value, Visit, Visitor};
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::engine::{AdapterRegistry, SqlDialect};
use crate::error::{GatewayError, Result};

/// Rows returned when the caller does not choose a limit
pub const DEFAULT_LIMIT: u64 = 1000;

/// Kind reported when more than one statement is submitted
pub const MULTIPLE_STATEMENTS: &str = "MULTIPLE STATEMENTS";

/// Validate that `sql` is a single pure read under `dialect`.
///
/// Returns the input text unchanged on success.
pub fn validate_read_only(sql: &str, dialect: SqlDialect) -> Result<String> {
    let statements = parse(sql, dialect).map_err(|err| match write_keyword_in(sql, dialect) {
        Some(kind) => GatewayError::disallowed_statement(kind),
        None => err,
    })?;

    let statement = match statements.as_slice() {
        [] => return Err(GatewayError::sql_syntax("Query cannot be empty")),
        [statement] => statement,
        _ => return Err(GatewayError::disallowed_statement(MULTIPLE_STATEMENTS)),
    };

    let Statement::Query(query) = statement else {
        return Err(GatewayError::disallowed_statement(statement_kind(statement)));
    };

    let mut guard = NestedWriteGuard;
    if let ControlFlow::Break(kind) = query.visit(&mut guard) {
        return Err(GatewayError::disallowed_statement(kind));
    }

    Ok(sql.to_string())
}

/// Attach `LIMIT limit` unless the statement already carries a row limit.
///
/// Any `LIMIT`/`FETCH` clause, at any nesting depth, leaves the text untouched.
/// Otherwise the query is re-rendered from its syntax tree. Input the parser rejects
/// (or that is not exactly one statement) is handled by [`bound_textually`].
#[must_use]
pub fn bound_query(sql: &str, dialect: SqlDialect, limit: u64) -> String {
    let mut statements = match parse(sql, dialect) {
        Ok(statements) if statements.len() == 1 => statements,
        _ => return bound_textually(sql, limit),
    };

    if statements[0].visit(&mut LimitFinder).is_break() {
        return sql.to_string();
    }

    match &mut statements[0] {
        Statement::Query(query) => {
            query.limit = Some(Expr::Value(Value::Number(limit.to_string(), false)))
        }
        // Only queries can be bounded; validation rejects everything else first
        _ => return sql.to_string(),
    }

    statements[0].to_string()
}

/// Append `LIMIT limit` unless a `LIMIT` token is already present (case-insensitive).
///
/// Trailing whitespace and statement terminators are stripped before appending.
#[must_use]
pub fn bound_textually(sql: &str, limit: u64) -> String {
    if contains_limit_token(sql) {
        return sql.to_string();
    }
    let body = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{body} LIMIT {limit}")
}

fn contains_limit_token(sql: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token.eq_ignore_ascii_case("LIMIT"))
}

fn parse(sql: &str, dialect: SqlDialect) -> Result<Vec<Statement>> {
    Parser::parse_sql(&*dialect.parser_dialect(), sql)
        .map_err(|e| GatewayError::sql_syntax(e.to_string()))
}

/// First write keyword standing at statement position in `sql`.
///
/// Statement position is the start of input, or right after `(` or `;`. Literals and
/// quoted identifiers are separate tokens, so their contents never match.
/// `CREATE`/`ALTER` carry the object keyword that follows them, as [`statement_kind`] does.
fn write_keyword_in(sql: &str, dialect: SqlDialect) -> Option<String> {
    let tokens = Tokenizer::new(&*dialect.parser_dialect(), sql).tokenize().ok()?;
    let mut words = tokens
        .iter()
        .filter(|token| !matches!(token, Token::Whitespace(_)));

    let mut at_statement_start = true;
    while let Some(token) = words.next() {
        if at_statement_start {
            if let Token::Word(word) = token {
                let kind = match word.keyword {
                    Keyword::INSERT => Some("INSERT"),
                    Keyword::UPDATE => Some("UPDATE"),
                    Keyword::DELETE => Some("DELETE"),
                    Keyword::DROP => Some("DROP"),
                    Keyword::TRUNCATE => Some("TRUNCATE"),
                    Keyword::MERGE => Some("MERGE"),
                    Keyword::CREATE => Some("CREATE"),
                    Keyword::ALTER => Some("ALTER"),
                    _ => None,
                };
                if let Some(kind) = kind {
                    let object = match (kind, words.next()) {
                        ("CREATE" | "ALTER", Some(Token::Word(next))) => match next.keyword {
                            Keyword::TABLE => Some("TABLE"),
                            Keyword::VIEW => Some("VIEW"),
                            Keyword::INDEX => Some("INDEX"),
                            Keyword::SCHEMA => Some("SCHEMA"),
                            Keyword::DATABASE => Some("DATABASE"),
                            _ => None,
                        },
                        _ => None,
                    };
                    return Some(object.map_or_else(|| kind.to_string(), |object| format!("{kind} {object}")));
                }
            }
        }
        at_statement_start = matches!(token, Token::LParen | Token::SemiColon);
    }
    None
}

/// Short keyword naming a statement type (`DELETE`, `CREATE TABLE`, ...)
fn statement_kind(statement: &Statement) -> String {
    let kind = match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::Merge { .. } => "MERGE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex { .. } => "CREATE INDEX",
        Statement::CreateSchema { .. } => "CREATE SCHEMA",
        Statement::CreateDatabase { .. } => "CREATE DATABASE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::AlterView { .. } => "ALTER VIEW",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Explain { .. } => "EXPLAIN",
        _ => {
            return statement
                .to_string()
                .split_whitespace()
                .next()
                .map_or_else(|| "UNKNOWN".to_string(), str::to_ascii_uppercase);
        }
    };
    kind.to_string()
}

/// Breaks on the first statement found inside a query, or on `SELECT ... INTO`
struct NestedWriteGuard;

impl Visitor for NestedWriteGuard {
    type Break = String;

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        ControlFlow::Break(statement_kind(statement))
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if selects_into(&query.body) {
            return ControlFlow::Break("SELECT INTO".to_string());
        }
        ControlFlow::Continue(())
    }
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

/// Breaks on the first query carrying `LIMIT`, `LIMIT BY` or `FETCH`
struct LimitFinder;

impl Visitor for LimitFinder {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if query.limit.is_some() || query.fetch.is_some() || !query.limit_by.is_empty() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// Registry-aware front end: resolves the dialect from the engine identifier
#[derive(Debug, Clone)]
pub struct QueryValidator {
    registry: Arc<AdapterRegistry>,
}

impl QueryValidator {
    #[must_use]
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Dialect declared by the engine's adapter
    pub fn dialect_for(&self, engine_id: &str) -> Result<SqlDialect> {
        Ok(self.registry.resolve(engine_id)?.dialect())
    }

    /// Read-only check under the engine's dialect; `UnsupportedEngine` if unregistered
    pub fn validate(&self, sql: &str, engine_id: &str) -> Result<String> {
        let dialect = self.dialect_for(engine_id)?;
        validate_read_only(sql, dialect)
    }

    /// Bound `sql` for the engine; never fails (unknown engines get the textual fallback)
    #[must_use]
    pub fn ensure_bounded(&self, sql: &str, engine_id: &str, limit: u64) -> String {
        match self.dialect_for(engine_id) {
            Ok(dialect) => bound_query(sql, dialect, limit),
            Err(_) => bound_textually(sql, limit),
        }
    }
}
