use std::sync::LazyLock;

use regex::Regex;

use crate::fhirpath_ast::LiteralValue;
use crate::sql_dialect::{ComparisonOp, SqlType};

use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

const INTEGER_PATTERN: &str = "^[+-]?[0-9]+$";
const DECIMAL_PATTERN: &str = "^[+-]?[0-9]+(\\.[0-9]+)?$";
const TRUE_STRINGS: &[&str] = &["true", "t", "yes", "y", "1", "1.0"];
const FALSE_STRINGS: &[&str] = &["false", "f", "no", "n", "0", "0.0"];

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(INTEGER_PATTERN).expect("valid integer regex"));
static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DECIMAL_PATTERN).expect("valid decimal regex"));

impl Translator {
    pub(super) fn conversion_function(&self, call: &Call<'_>) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let (target, test_only) = match call.name {
            "toString" => (SqlType::String, false),
            "toInteger" => (SqlType::Integer, false),
            "toDecimal" => (SqlType::Decimal, false),
            "toBoolean" => (SqlType::Boolean, false),
            "convertsToString" => (SqlType::String, true),
            "convertsToInteger" => (SqlType::Integer, true),
            "convertsToDecimal" => (SqlType::Decimal, true),
            "convertsToBoolean" => (SqlType::Boolean, true),
            other => return Err(call.invalid(format!("'{}' is not a conversion function", other))),
        };

        if let Some(folded) = call
            .input
            .literal
            .as_ref()
            .and_then(|literal| self.fold_literal(literal, target))
        {
            let (sql, sql_type) = if test_only {
                (d.boolean_literal(folded.is_some()), SqlType::Boolean)
            } else {
                (folded.unwrap_or_else(|| d.typed_null(target)), target)
            };
            return Ok(SqlExpr::constant(sql, sql_type, call.path.as_str()));
        }

        let converted = self.convert(&call.input, target);
        if !test_only {
            return Ok(SqlExpr::composite(
                converted,
                ValueShape::Native(target),
                &[&call.input],
                call.path.as_str(),
            ));
        }

        let single = self.as_singleton(&call.input);
        let sql = d.case_when(
            &[(d.is_null(&single.sql), "NULL".to_string())],
            Some(&d.is_not_null(&converted)),
        );
        Ok(SqlExpr::composite(
            sql,
            ValueShape::Native(SqlType::Boolean),
            &[&call.input],
            call.path.as_str(),
        ))
    }

    /// SQL converting a single value to `target`, NULL when it does not convert.
    fn convert(&self, input: &SqlExpr, target: SqlType) -> String {
        let d = self.dialect.as_ref();
        let source = input.scalar_type();
        if source == Some(target) {
            return self.as_native(input, target).sql;
        }
        if input.is_null_literal() {
            return d.typed_null(target);
        }

        match (target, source) {
            (SqlType::String, _) => self.as_string(input).sql,

            (SqlType::Integer, Some(SqlType::Boolean)) | (SqlType::Decimal, Some(SqlType::Boolean)) => {
                let b = self.as_native(input, SqlType::Boolean);
                let (one, zero) = match target {
                    SqlType::Integer => ("1".to_string(), "0".to_string()),
                    _ => (d.decimal_literal("1.0"), d.decimal_literal("0.0")),
                };
                d.case_when(
                    &[(d.is_null(&b.sql), "NULL".to_string()), (b.sql.clone(), one)],
                    Some(&zero),
                )
            }
            (SqlType::Decimal, Some(SqlType::Integer)) => {
                d.cast(&self.as_native(input, SqlType::Integer).sql, SqlType::Decimal)
            }
            (SqlType::Integer, None) | (SqlType::Integer, Some(SqlType::String)) => {
                self.parse_text(input, target, INTEGER_PATTERN)
            }
            (SqlType::Decimal, None) | (SqlType::Decimal, Some(SqlType::String)) => {
                self.parse_text(input, target, DECIMAL_PATTERN)
            }

            (SqlType::Boolean, Some(SqlType::Integer)) | (SqlType::Boolean, Some(SqlType::Decimal)) => {
                let n = self.as_native(input, source.unwrap_or(SqlType::Decimal));
                d.case_when(
                    &[
                        (d.comparison(&n.sql, ComparisonOp::Eq, "1"), d.boolean_literal(true)),
                        (d.comparison(&n.sql, ComparisonOp::Eq, "0"), d.boolean_literal(false)),
                    ],
                    None,
                )
            }
            (SqlType::Boolean, None) | (SqlType::Boolean, Some(SqlType::String)) => {
                let text = d.lower(&self.as_string(input).sql);
                let strings = |values: &[&str]| -> Vec<String> {
                    values.iter().map(|v| d.string_literal(v)).collect()
                };
                d.case_when(
                    &[
                        (d.in_list(&text, &strings(TRUE_STRINGS)), d.boolean_literal(true)),
                        (d.in_list(&text, &strings(FALSE_STRINGS)), d.boolean_literal(false)),
                    ],
                    None,
                )
            }

            _ => d.typed_null(target),
        }
    }

    /// Convert a string literal while translating, so no cast of a
    /// non-matching constant reaches the database.
    ///
    /// `None` leaves the conversion to SQL; `Some(None)` means the literal
    /// does not convert.
    fn fold_literal(&self, literal: &LiteralValue, target: SqlType) -> Option<Option<String>> {
        let d = self.dialect.as_ref();
        let LiteralValue::String(text) = literal else {
            return None;
        };
        let folded = match target {
            SqlType::Integer => INTEGER_RE
                .is_match(text)
                .then(|| text.parse::<i64>().ok())
                .flatten()
                .map(|value| d.integer_literal(value)),
            SqlType::Decimal => DECIMAL_RE
                .is_match(text)
                .then(|| d.decimal_literal(text.trim_start_matches('+'))),
            SqlType::Boolean => {
                let lowered = text.to_lowercase();
                if TRUE_STRINGS.contains(&lowered.as_str()) {
                    Some(d.boolean_literal(true))
                } else if FALSE_STRINGS.contains(&lowered.as_str()) {
                    Some(d.boolean_literal(false))
                } else {
                    None
                }
            }
            _ => return None,
        };
        Some(folded)
    }

    /// Cast text that matches `pattern`; anything else is NULL.
    fn parse_text(&self, input: &SqlExpr, target: SqlType, pattern: &str) -> String {
        let d = self.dialect.as_ref();
        let text = self.as_string(input);
        d.case_when(
            &[(
                d.regex_match(&text.sql, &d.string_literal(pattern), false),
                d.try_cast_text(&text.sql, target),
            )],
            None,
        )
    }
}
