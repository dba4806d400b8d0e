use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use crate::fhirpath_ast::{ExpressionNode, LiteralValue};
use crate::sql_dialect::SqlType;

use super::errors::TranslationError;
use super::expr::SqlExpr;
use super::Translator;

static FULL_DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})T(\d{2}:\d{2}(:\d{2}(\.\d+)?)?)(Z|[+-]\d{2}:\d{2})?$")
        .expect("valid datetime regex")
});

impl Translator {
    pub(super) fn visit_literal(
        &self,
        value: &LiteralValue,
        node: &ExpressionNode,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let path = node.to_string();
        let expr = match value {
            LiteralValue::Empty => SqlExpr::empty(path),
            LiteralValue::Boolean(b) => SqlExpr::constant(d.boolean_literal(*b), SqlType::Boolean, path),
            LiteralValue::String(s) => SqlExpr::constant(d.string_literal(s), SqlType::String, path),
            LiteralValue::Integer(i) => SqlExpr::constant(d.integer_literal(*i), SqlType::Integer, path),
            LiteralValue::Decimal(text) => {
                SqlExpr::constant(d.decimal_literal(text), SqlType::Decimal, path)
            }
            LiteralValue::Date(text) => {
                check_full_date("date", text)?;
                SqlExpr::constant(d.date_literal(text), SqlType::Date, path)
            }
            LiteralValue::DateTime(text) => {
                let Some(captures) = FULL_DATETIME_RE.captures(text) else {
                    return Err(unsupported(
                        "datetime",
                        text,
                        "partial-precision datetimes are not supported",
                    ));
                };
                check_full_date("datetime", &captures[1])?;
                SqlExpr::constant(d.datetime_literal(text), SqlType::DateTime, path)
            }
            LiteralValue::Time(text) => {
                if NaiveTime::parse_from_str(text, "%H:%M:%S%.f").is_err() {
                    return Err(unsupported(
                        "time",
                        text,
                        "times need hours, minutes and seconds",
                    ));
                }
                SqlExpr::constant(d.time_literal(text), SqlType::Time, path)
            }
        };
        Ok(expr.with_literal(value.clone()))
    }
}

fn check_full_date(literal_type: &'static str, text: &str) -> Result<(), TranslationError> {
    if text.len() != 10 {
        return Err(unsupported(
            literal_type,
            text,
            "partial-precision dates are not supported",
        ));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|e| unsupported(literal_type, text, &e.to_string()))
}

fn unsupported(literal_type: &'static str, value: &str, reason: &str) -> TranslationError {
    TranslationError::UnsupportedLiteral {
        literal_type,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_dialect::{DuckDbDialect, PostgresDialect};
    use crate::translator::ValueShape;
    use std::sync::Arc;

    #[test]
    fn test_literals_are_constants() {
        let t = Translator::new(Arc::new(PostgresDialect::new()));
        let node = ExpressionNode::date("2020-02-29");
        let expr = t
            .visit_literal(&LiteralValue::Date("2020-02-29".into()), &node)
            .unwrap();
        assert_eq!(expr.sql, "'2020-02-29'::date");
        assert!(expr.tables.is_empty());
        assert_eq!(expr.shape, ValueShape::Native(SqlType::Date));
    }

    #[test]
    fn test_partial_dates_are_rejected() {
        let t = Translator::new(Arc::new(DuckDbDialect::new()));
        let node = ExpressionNode::date("2020-01");
        let err = t
            .visit_literal(&LiteralValue::Date("2020-01".into()), &node)
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::UnsupportedLiteral { literal_type: "date", .. }
        ));

        let node = ExpressionNode::datetime("2020-01-01T10");
        assert!(t
            .visit_literal(&LiteralValue::DateTime("2020-01-01T10".into()), &node)
            .is_err());
        assert!(t
            .visit_literal(&LiteralValue::Time("10:30".into()), &node)
            .is_err());
    }

    #[test]
    fn test_full_datetime_is_accepted() {
        let t = Translator::new(Arc::new(DuckDbDialect::new()));
        let node = ExpressionNode::datetime("2020-01-01T10:00:00Z");
        let expr = t
            .visit_literal(&LiteralValue::DateTime("2020-01-01T10:00:00Z".into()), &node)
            .unwrap();
        assert_eq!(expr.sql, "TIMESTAMPTZ '2020-01-01T10:00:00Z'");
    }
}
