//! Structural validation of FHIRPath ASTs.
//!
//! Runs before translation so that malformed or incomplete trees are rejected
//! with the offending construct named, instead of being coerced into defaults.
//! Identifiers end up inside JSON path strings of the generated SQL, so they are
//! restricted to the FHIR element-name alphabet here.

use super::ast::{ExpressionNode, LiteralValue, NODE_KINDS};
use super::errors::AstValidationError;
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Default limit for nested expression depth
pub const DEFAULT_MAX_DEPTH: usize = 128;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\$(this|index|total)|%[A-Za-z_][A-Za-z0-9_\-]*)$").expect("valid variable regex")
});

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}(-\d{2}(-\d{2})?)?$").expect("valid date regex"));

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}(-\d{2}(-\d{2}(T(\d{2}(:\d{2}(:\d{2}(\.\d+)?)?)?)?(Z|[+-]\d{2}:\d{2})?)?)?)?$",
    )
    .expect("valid datetime regex")
});

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}(:\d{2}(:\d{2}(\.\d+)?)?)?$").expect("valid time regex"));

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("valid decimal regex"));

/// Validate the structure of an expression tree.
pub fn validate_expression(
    node: &ExpressionNode,
    max_depth: usize,
) -> Result<(), AstValidationError> {
    validate_node(node, node, 1, max_depth)
}

fn validate_node(
    root: &ExpressionNode,
    node: &ExpressionNode,
    depth: usize,
    max_depth: usize,
) -> Result<(), AstValidationError> {
    if depth > max_depth {
        return Err(AstValidationError::DepthExceeded { limit: max_depth });
    }

    match node {
        ExpressionNode::Literal { value } => validate_literal(value)?,
        ExpressionNode::Identifier { name } | ExpressionNode::Path { name, .. } => {
            validate_identifier(root, name)?
        }
        ExpressionNode::Variable { name } => {
            if !VARIABLE_RE.is_match(name) {
                return Err(AstValidationError::InvalidVariable(name.clone()));
            }
        }
        ExpressionNode::FunctionCall { name, .. } => {
            if !IDENTIFIER_RE.is_match(name) {
                return Err(AstValidationError::InvalidFunctionName(name.clone()));
            }
        }
        ExpressionNode::TypeOperation { type_specifier, .. } => {
            let namespace_ok = type_specifier
                .namespace
                .as_deref()
                .map_or(true, |ns| IDENTIFIER_RE.is_match(ns));
            if !namespace_ok || !IDENTIFIER_RE.is_match(&type_specifier.name) {
                return Err(AstValidationError::InvalidTypeSpecifier {
                    type_name: type_specifier.to_string(),
                    expression: root.to_string(),
                });
            }
        }
        ExpressionNode::BinaryOperation { .. }
        | ExpressionNode::UnaryOperation { .. }
        | ExpressionNode::Union { .. }
        | ExpressionNode::Indexer { .. } => {}
    }

    for child in node.children() {
        validate_node(root, child, depth + 1, max_depth)?;
    }
    Ok(())
}

fn validate_identifier(root: &ExpressionNode, name: &str) -> Result<(), AstValidationError> {
    if name.is_empty() {
        return Err(AstValidationError::EmptyIdentifier(root.to_string()));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(AstValidationError::InvalidIdentifier {
            name: name.to_string(),
            expression: root.to_string(),
        });
    }
    Ok(())
}

fn malformed(literal_type: &'static str, value: &str, reason: &str) -> AstValidationError {
    AstValidationError::MalformedLiteral {
        literal_type,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_literal(value: &LiteralValue) -> Result<(), AstValidationError> {
    match value {
        LiteralValue::Empty
        | LiteralValue::Boolean(_)
        | LiteralValue::String(_)
        | LiteralValue::Integer(_) => Ok(()),
        LiteralValue::Decimal(text) => {
            if DECIMAL_RE.is_match(text) {
                Ok(())
            } else {
                Err(malformed("decimal", text, "expected digits with an optional fraction"))
            }
        }
        LiteralValue::Date(text) => {
            if !DATE_RE.is_match(text) {
                return Err(malformed("date", text, "expected YYYY[-MM[-DD]]"));
            }
            check_calendar_date(text, "date")
        }
        LiteralValue::DateTime(text) => {
            if !DATETIME_RE.is_match(text) {
                return Err(malformed(
                    "datetime",
                    text,
                    "expected YYYY-MM-DDThh:mm:ss[.fff][Z|+hh:mm]",
                ));
            }
            let date_part = text.split('T').next().unwrap_or(text);
            check_calendar_date(date_part, "datetime")
        }
        LiteralValue::Time(text) => {
            if !TIME_RE.is_match(text) {
                return Err(malformed("time", text, "expected hh[:mm[:ss[.fff]]]"));
            }
            if text.len() >= 8 && NaiveTime::parse_from_str(&text[..8], "%H:%M:%S").is_err() {
                return Err(malformed("time", text, "not a valid time of day"));
            }
            Ok(())
        }
    }
}

/// Full-precision dates must name a real calendar day.
fn check_calendar_date(text: &str, literal_type: &'static str) -> Result<(), AstValidationError> {
    if text.len() == 10 && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() {
        return Err(malformed(literal_type, text, "not a valid calendar date"));
    }
    Ok(())
}

/// Deserialize the JSON wire form of an AST.
///
/// Unknown `kind` tags are reported as [`AstValidationError::UnrecognizedNodeKind`]
/// rather than a generic deserialization failure.
pub fn parse_ast_json(json: &str) -> Result<ExpressionNode, AstValidationError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AstValidationError::MalformedInput(e.to_string()))?;

    check_node_kinds(&value)?;

    serde_json::from_value(value).map_err(|e| AstValidationError::MalformedInput(e.to_string()))
}

fn check_node_kinds(value: &Value) -> Result<(), AstValidationError> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(kind)) = map.get("kind") {
                if !NODE_KINDS.contains(&kind.as_str()) {
                    return Err(AstValidationError::UnrecognizedNodeKind(kind.clone()));
                }
            }
            map.values().try_for_each(check_node_kinds)
        }
        Value::Array(items) => items.iter().try_for_each(check_node_kinds),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhirpath_ast::ast::TypeSpecifier;

    #[test]
    fn test_valid_expression_passes() {
        let node = ExpressionNode::dotted("Patient.name.given")
            .call("first", vec![])
            .call("upper", vec![]);
        assert!(validate_expression(&node, DEFAULT_MAX_DEPTH).is_ok());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let node = ExpressionNode::identifier("Patient").path("");
        assert!(matches!(
            validate_expression(&node, DEFAULT_MAX_DEPTH),
            Err(AstValidationError::EmptyIdentifier(_))
        ));
    }

    #[test]
    fn test_identifier_with_quote_rejected() {
        let node = ExpressionNode::identifier("Patient").path("name' OR 1=1 --");
        let err = validate_expression(&node, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(matches!(err, AstValidationError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_malformed_date_literal_rejected() {
        let node = ExpressionNode::date("2020-02-30");
        let err = validate_expression(&node, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(err.to_string().contains("not a valid calendar date"));

        let node = ExpressionNode::date("20-01-01");
        assert!(validate_expression(&node, DEFAULT_MAX_DEPTH).is_err());
    }

    #[test]
    fn test_datetime_and_time_formats() {
        assert!(validate_expression(
            &ExpressionNode::datetime("2020-01-01T10:30:00.123+02:00"),
            DEFAULT_MAX_DEPTH
        )
        .is_ok());
        assert!(validate_expression(
            &ExpressionNode::literal(LiteralValue::Time("25:00:00".into())),
            DEFAULT_MAX_DEPTH
        )
        .is_err());
    }

    #[test]
    fn test_invalid_type_specifier() {
        let node = ExpressionNode::TypeOperation {
            operator: crate::fhirpath_ast::ast::TypeOperator::Is,
            operand: Box::new(ExpressionNode::identifier("x")),
            type_specifier: TypeSpecifier::new(""),
        };
        assert!(matches!(
            validate_expression(&node, DEFAULT_MAX_DEPTH),
            Err(AstValidationError::InvalidTypeSpecifier { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut node = ExpressionNode::identifier("a");
        for _ in 0..10 {
            node = node.path("b");
        }
        assert!(validate_expression(&node, 20).is_ok());
        assert_eq!(
            validate_expression(&node, 5),
            Err(AstValidationError::DepthExceeded { limit: 5 })
        );
    }

    #[test]
    fn test_unknown_node_kind_in_json() {
        let json = r#"{"kind": "path", "base": {"kind": "lambda", "body": []}, "name": "x"}"#;
        assert_eq!(
            parse_ast_json(json),
            Err(AstValidationError::UnrecognizedNodeKind("lambda".to_string()))
        );
    }

    #[test]
    fn test_parse_json_function_call() {
        let json = r#"{
            "kind": "function_call",
            "base": {"kind": "identifier", "name": "name"},
            "name": "exists"
        }"#;
        let node = parse_ast_json(json).unwrap();
        assert_eq!(node, ExpressionNode::identifier("name").call("exists", vec![]));
    }
}
