//! SQL dialect abstraction.
//!
//! A [`Dialect`] spells primitive SQL operations: literals, JSON access, array
//! helpers, unnesting, aggregation, string and numeric functions. It never
//! decides FHIRPath semantics. Null handling, empty-collection rules and
//! domain guards are composed by the translator out of these primitives, so
//! the two implementations differ only in syntax.

pub mod duckdb;
pub mod postgres;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::type_registry::TypeEntry;

pub use duckdb::DuckDbDialect;
pub use postgres::PostgresDialect;

/// Supported target databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    DuckDb,
    PostgreSql,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::DuckDb => "duckdb",
            DialectKind::PostgreSql => "postgresql",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" | "duck" => Ok(DialectKind::DuckDb),
            "postgresql" | "postgres" | "pg" => Ok(DialectKind::PostgreSql),
            other => Err(format!(
                "unknown dialect '{}' (expected 'duckdb' or 'postgresql')",
                other
            )),
        }
    }
}

/// Build the dialect implementation for a kind.
pub fn create_dialect(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::DuckDb => Arc::new(DuckDbDialect::new()),
        DialectKind::PostgreSql => Arc::new(PostgresDialect::new()),
    }
}

/// SQL scalar types the translator converts JSON values into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
}

impl SqlType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::DateTime | SqlType::Time)
    }

    /// Scalar type for a System type name (`Integer`, `String`, ...).
    pub fn from_system_type(name: &str) -> Option<Self> {
        match name {
            "String" => Some(SqlType::String),
            "Integer" => Some(SqlType::Integer),
            "Decimal" => Some(SqlType::Decimal),
            "Boolean" => Some(SqlType::Boolean),
            "Date" => Some(SqlType::Date),
            "DateTime" => Some(SqlType::DateTime),
            "Time" => Some(SqlType::Time),
            _ => None,
        }
    }

    /// The System type a scalar of this kind carries.
    pub fn system_type(&self) -> &'static str {
        match self {
            SqlType::String => "String",
            SqlType::Integer => "Integer",
            SqlType::Decimal => "Decimal",
            SqlType::Boolean => "Boolean",
            SqlType::Date => "Date",
            SqlType::DateTime => "DateTime",
            SqlType::Time => "Time",
        }
    }
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    /// `[*]`: every element of an array, flattened into the result
    Wildcard,
    Index(i64),
}

/// A JSON path relative to some JSON value. Paths containing a wildcard
/// produce a JSON array; the others produce a single JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath {
    pub segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.segments.push(PathSegment::Wildcard);
        self
    }

    pub fn index(mut self, index: i64) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&PathSegment::Wildcard)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Standard `$.a[*].b[0]` notation shared by DuckDB and SQL/JSON path.
    pub fn to_json_path_text(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                PathSegment::Wildcard => out.push_str("[*]"),
                PathSegment::Index(i) => out.push_str(&format!("[{}]", i)),
            }
        }
        out
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_path_text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    BoolAnd,
    BoolOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Abs,
    Ceiling,
    Floor,
    Truncate,
    Sqrt,
    Exp,
    Ln,
}

/// Syntax of one SQL database.
///
/// Every method takes already-translated SQL text and returns SQL text.
/// Implementations must stay behaviorally equivalent.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn name(&self) -> &'static str;

    // ===== Literals =====

    fn string_literal(&self, value: &str) -> String;

    fn integer_literal(&self, value: i64) -> String;

    /// `text` is a validated decimal literal
    fn decimal_literal(&self, text: &str) -> String;

    fn boolean_literal(&self, value: bool) -> String;

    /// Full-precision `YYYY-MM-DD`
    fn date_literal(&self, text: &str) -> String;

    fn datetime_literal(&self, text: &str) -> String;

    fn time_literal(&self, text: &str) -> String;

    /// A typed SQL NULL
    fn typed_null(&self, sql_type: SqlType) -> String;

    // ===== JSON access =====

    /// Extract a path from a JSON value. Wildcard paths return a JSON array.
    fn json_extract(&self, json: &str, path: &JsonPath) -> String;

    /// Convert a single JSON item to a SQL scalar; NULL when it does not convert.
    fn json_to_native(&self, json: &str, sql_type: SqlType) -> String;

    /// Wrap a SQL scalar (or a JSON value) as JSON.
    fn to_json(&self, expr: &str) -> String;

    /// Text form of a JSON scalar (strings without quotes)
    fn json_text(&self, json: &str) -> String;

    fn json_array_length(&self, json: &str) -> String;

    /// 0-based element access
    fn json_array_element(&self, json: &str, index: &str) -> String;

    fn json_build_array(&self, items: &[String]) -> String;

    fn empty_json_array(&self) -> String;

    fn json_array_concat(&self, left: &str, right: &str) -> String;

    /// Whether the array contains a JSON item equal to `item`
    fn json_array_contains(&self, array: &str, item: &str) -> String;

    /// Elements `[start, end)` with 0-based bounds; `end` of `None` means to the end
    fn json_array_slice(&self, array: &str, start: &str, end: Option<&str>) -> String;

    fn json_is_array(&self, json: &str) -> String;

    /// Predicate testing whether a JSON item has a primitive type, from the
    /// registry's rendering for this dialect. `None` when the type has no rendering.
    fn json_type_check(&self, json: &str, entry: &TypeEntry) -> Option<String>;

    // ===== Unnesting and re-aggregation =====

    /// FROM-clause item expanding a JSON array into rows exposing
    /// `alias.value` (JSON) and `alias.ordinal` (0-based).
    fn unnest_json_array(&self, array: &str, alias: &str) -> String;

    /// Aggregate JSON items into a JSON array (NULL over zero rows).
    fn json_array_agg(&self, value: &str, order_by: Option<&str>, distinct: bool) -> String;

    /// Aggregate JSON arrays into one flattened JSON array.
    fn json_array_flatten_agg(&self, value: &str, order_by: Option<&str>) -> String;

    fn aggregate(&self, function: AggregateFunction, expr: &str, filter: Option<&str>) -> String;

    fn string_agg(&self, expr: &str, separator: &str, order_by: Option<&str>) -> String;

    // ===== Strings =====

    fn concat(&self, left: &str, right: &str) -> String;

    /// `start` is 1-based
    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String;

    /// 1-based position of `needle`, 0 when absent
    fn string_position(&self, haystack: &str, needle: &str) -> String;

    fn string_length(&self, expr: &str) -> String;

    fn upper(&self, expr: &str) -> String;

    fn lower(&self, expr: &str) -> String;

    fn trim(&self, expr: &str) -> String;

    fn starts_with(&self, expr: &str, prefix: &str) -> String;

    fn ends_with(&self, expr: &str, suffix: &str) -> String;

    /// Case-sensitive substring test
    fn string_contains(&self, expr: &str, needle: &str) -> String;

    fn string_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String;

    /// `full` anchors the pattern at both ends
    fn regex_match(&self, expr: &str, pattern: &str, full: bool) -> String;

    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String;

    // ===== Numbers and casts =====

    fn cast(&self, expr: &str, sql_type: SqlType) -> String;

    /// Convert text to a scalar, NULL when the text does not parse.
    fn try_cast_text(&self, text: &str, sql_type: SqlType) -> String;

    fn math_function(&self, function: MathFunction, expr: &str) -> String;

    fn power(&self, base: &str, exponent: &str) -> String;

    fn log(&self, value: &str, base: &str) -> String;

    fn round(&self, expr: &str, precision: &str) -> String;

    fn is_finite(&self, expr: &str) -> String;

    /// Truncating integer division
    fn integer_divide(&self, left: &str, right: &str) -> String;

    fn modulo(&self, left: &str, right: &str) -> String;

    fn arithmetic(&self, left: &str, operator: &str, right: &str) -> String;

    /// An integer in a type wide enough to hold the result of any BIGINT
    /// sum, difference or product.
    fn widen_integer(&self, expr: &str) -> String;

    // ===== Logic and comparison =====

    fn comparison(&self, left: &str, op: ComparisonOp, right: &str) -> String;

    fn and(&self, left: &str, right: &str) -> String;

    fn or(&self, left: &str, right: &str) -> String;

    fn not(&self, expr: &str) -> String;

    fn is_null(&self, expr: &str) -> String;

    fn is_not_null(&self, expr: &str) -> String;

    fn case_when(&self, branches: &[(String, String)], otherwise: Option<&str>) -> String;

    fn coalesce(&self, exprs: &[String]) -> String;

    fn nullif(&self, expr: &str, value: &str) -> String;

    /// `expr IN (items...)`
    fn in_list(&self, expr: &str, items: &[String]) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_path_text() {
        let path = JsonPath::new().field("name").wildcard().field("given").index(0);
        assert_eq!(path.to_json_path_text(), "$.name[*].given[0]");
        assert!(path.has_wildcard());
        assert_eq!(JsonPath::new().to_json_path_text(), "$");
    }

    #[test]
    fn test_dialect_kind_parse() {
        assert_eq!("DuckDB".parse::<DialectKind>(), Ok(DialectKind::DuckDb));
        assert_eq!("postgres".parse::<DialectKind>(), Ok(DialectKind::PostgreSql));
        assert!("oracle".parse::<DialectKind>().is_err());
    }

    #[test]
    fn test_create_dialect_matches_kind() {
        for kind in [DialectKind::DuckDb, DialectKind::PostgreSql] {
            assert_eq!(create_dialect(kind).kind(), kind);
        }
    }

    #[test]
    fn test_sql_type_system_names() {
        assert_eq!(SqlType::from_system_type("Integer"), Some(SqlType::Integer));
        assert_eq!(SqlType::DateTime.system_type(), "DateTime");
        assert!(SqlType::from_system_type("Quantity").is_none());
    }
}
