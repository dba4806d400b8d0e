//! The same expression on both dialects: identical semantics, dialect spelling.

use std::sync::Arc;

use fhirpath_sql::fhirpath_ast::{BinaryOperator, ExpressionNode};
use fhirpath_sql::sql_dialect::{create_dialect, DialectKind};
use fhirpath_sql::translator::{SqlFragment, TranslationError, Translator, META_VALUE_KIND};
use fhirpath_sql::TranslatorConfig;
use test_case::test_case;

fn translator(dialect: DialectKind) -> Translator {
    Translator::with_config(
        create_dialect(dialect),
        TranslatorConfig {
            dialect,
            resource_type: Some("Patient".to_string()),
            ..Default::default()
        },
    )
}

/// The fragment holding the expression's value: the only one for constants,
/// otherwise the one before the terminal projection.
fn result(dialect: DialectKind, ast: &ExpressionNode) -> SqlFragment {
    let fragments = translator(dialect).translate(ast).unwrap();
    if fragments.len() == 1 {
        fragments[0].clone()
    } else {
        fragments[fragments.len() - 2].clone()
    }
}

#[test_case(DialectKind::DuckDb, "contains('hello', '')" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "(strpos('hello', '') > 0)" ; "postgresql")]
fn test_contains_empty_substring(dialect: DialectKind, expected: &str) {
    let ast = ExpressionNode::string("hello").call("contains", vec![ExpressionNode::string("")]);
    let fragment = result(dialect, &ast);
    assert_eq!(fragment.expression, expected);
    assert_eq!(fragment.meta(META_VALUE_KIND), Some("native:Boolean"));
}

#[test_case(DialectKind::DuckDb ; "duckdb")]
#[test_case(DialectKind::PostgreSql ; "postgresql")]
fn test_count_of_empty_is_zero(dialect: DialectKind) {
    let ast = ExpressionNode::empty().call("count", vec![]);
    assert_eq!(
        result(dialect, &ast).expression,
        "CASE WHEN (NULL IS NULL) THEN 0 ELSE 1 END"
    );
}

#[test_case(DialectKind::DuckDb, "COALESCE(json_array_length(" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "COALESCE(jsonb_array_length(" ; "postgresql")]
fn test_count_defaults_to_zero(dialect: DialectKind, prefix: &str) {
    let ast = ExpressionNode::dotted("Patient.name").call("count", vec![]);
    let count = result(dialect, &ast);
    assert!(count.expression.starts_with(prefix), "{}", count.expression);
    assert!(count.expression.ends_with(", 0)"));
}

#[test_case(DialectKind::DuckDb, "TRUE" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "true" ; "postgresql")]
fn test_type_test_applies_to_whole_operand(dialect: DialectKind, truth: &str) {
    let sum = ExpressionNode::binary(
        BinaryOperator::Add,
        ExpressionNode::integer(2),
        ExpressionNode::integer(3),
    );
    assert_eq!(
        result(dialect, &sum.is_type("Integer")).expression,
        format!("CASE WHEN ((2 + 3) IS NULL) THEN NULL ELSE {} END", truth)
    );
}

#[test_case(DialectKind::DuckDb, "FALSE" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "false" ; "postgresql")]
fn test_type_test_on_absent_value_is_empty(dialect: DialectKind, falsity: &str) {
    let ast = ExpressionNode::dotted("Patient.birthDate").is_type("String");
    let expression = result(dialect, &ast).expression;
    assert!(expression.starts_with("CASE WHEN ("), "{}", expression);
    assert!(expression.ends_with(&format!("IS NULL) THEN NULL ELSE {} END", falsity)));
}

#[test_case(DialectKind::DuckDb ; "duckdb")]
#[test_case(DialectKind::PostgreSql ; "postgresql")]
fn test_extra_argument_is_an_arity_error(dialect: DialectKind) {
    let ast = ExpressionNode::string("abc").call("length", vec![ExpressionNode::integer(1)]);
    match translator(dialect).translate(&ast) {
        Err(TranslationError::WrongArity {
            function, actual, ..
        }) => {
            assert_eq!(function, "length");
            assert_eq!(actual, 1);
        }
        other => panic!("expected an arity error, got {:?}", other),
    }
}

#[test_case(DialectKind::DuckDb ; "duckdb")]
#[test_case(DialectKind::PostgreSql ; "postgresql")]
fn test_sqrt_of_negative_is_guarded(dialect: DialectKind) {
    let ast = ExpressionNode::negate(ExpressionNode::integer(1)).call("sqrt", vec![]);
    let expression = result(dialect, &ast).expression;
    assert!(expression.starts_with("CASE WHEN ("), "{}", expression);
    assert!(expression.contains(" < 0) THEN NULL ELSE sqrt("), "{}", expression);
}

#[test_case(DialectKind::DuckDb, "pow(" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "power(" ; "postgresql")]
fn test_zero_to_the_zero_is_not_guarded_away(dialect: DialectKind, power: &str) {
    let ast = ExpressionNode::integer(0).call("power", vec![ExpressionNode::integer(0)]);
    let expression = result(dialect, &ast).expression;
    // the guard only rejects a negative exponent on zero
    assert!(expression.contains(" = 0) AND ("), "{}", expression);
    assert!(expression.contains(" < 0))"), "{}", expression);
    assert!(expression.contains(power), "{}", expression);
}

#[test_case(DialectKind::DuckDb ; "duckdb")]
#[test_case(DialectKind::PostgreSql ; "postgresql")]
fn test_fragment_shape_matches_across_dialects(dialect: DialectKind) {
    let ast = ExpressionNode::dotted("Patient.name")
        .call(
            "where",
            vec![ExpressionNode::binary(
                BinaryOperator::Equal,
                ExpressionNode::identifier("family"),
                ExpressionNode::string("Smith"),
            )],
        )
        .call("count", vec![]);
    let duckdb = translator(DialectKind::DuckDb).translate(&ast).unwrap();
    let other = translator(dialect).translate(&ast).unwrap();

    let shape = |fragments: &[SqlFragment]| -> Vec<(String, Vec<String>, bool, bool)> {
        fragments
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    f.dependencies.clone(),
                    f.requires_unnest,
                    f.is_aggregate,
                )
            })
            .collect()
    };
    assert_eq!(shape(&duckdb), shape(&other));
}

#[test]
fn test_dialect_instances_are_shareable() {
    let dialect = create_dialect(DialectKind::PostgreSql);
    let first = Translator::new(Arc::clone(&dialect));
    let second = Translator::new(dialect);
    let ast = ExpressionNode::dotted("Patient.gender");
    assert_eq!(first.translate(&ast).unwrap(), second.translate(&ast).unwrap());
}

#[test_case(DialectKind::DuckDb, "pow(" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "power(" ; "postgresql")]
fn test_power_overflow_is_decided_before_evaluating(dialect: DialectKind, power: &str) {
    let ast = ExpressionNode::integer(10).call("power", vec![ExpressionNode::integer(400)]);
    let expression = result(dialect, &ast).expression;
    let overflow = expression.find(" > 709) THEN NULL").expect("overflow guard");
    assert!(expression.contains(" = 0) THEN 1 ELSE abs("), "{}", expression);
    assert!(expression.contains(" < -708) THEN "), "{}", expression);
    assert!(overflow < expression.find(power).unwrap_or(0), "{}", expression);
}

#[test_case(DialectKind::DuckDb, "CAST(NULL AS BIGINT)", "FALSE" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "NULL::bigint", "false" ; "postgresql")]
fn test_unconvertible_literal_is_decided_in_translation(
    dialect: DialectKind,
    empty: &str,
    falsity: &str,
) {
    let ast = ExpressionNode::string("abc").call("toInteger", vec![]);
    assert_eq!(result(dialect, &ast).expression, empty);

    let ast = ExpressionNode::string("1.5").call("convertsToInteger", vec![]);
    let expression = result(dialect, &ast).expression;
    assert_eq!(expression, falsity);
    assert!(!expression.contains("CAST('"));
}

#[test_case(DialectKind::DuckDb, "TRY_CAST(" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, " ~* '^[0-9]{4}-" ; "postgresql")]
fn test_choice_comparison_reads_compatible_key(dialect: DialectKind, guarded: &str) {
    let ast = ExpressionNode::binary(
        BinaryOperator::GreaterThan,
        ExpressionNode::dotted("Patient.deceased"),
        ExpressionNode::datetime("2019-01-01T00:00:00Z"),
    );
    let expression = result(dialect, &ast).expression;
    assert!(expression.contains("deceasedDateTime"), "{}", expression);
    assert!(!expression.contains("deceasedBoolean"), "{}", expression);
    assert!(expression.contains(guarded), "{}", expression);
}

#[test_case(DialectKind::DuckDb, "CAST(NULL AS BIGINT)", "AS HUGEINT)" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "NULL::bigint", "AS NUMERIC)" ; "postgresql")]
fn test_integer_overflow_is_empty(dialect: DialectKind, empty: &str, widened: &str) {
    let ast = ExpressionNode::binary(
        BinaryOperator::Multiply,
        ExpressionNode::integer(i64::MAX),
        ExpressionNode::integer(2),
    );
    assert_eq!(result(dialect, &ast).expression, empty);

    let ast = ExpressionNode::binary(
        BinaryOperator::Multiply,
        ExpressionNode::dotted("Patient.name").call("count", vec![]),
        ExpressionNode::integer(i64::MAX),
    );
    let expression = result(dialect, &ast).expression;
    assert!(expression.contains(widened), "{}", expression);
    assert!(
        expression.contains(" > 9223372036854775807)) THEN NULL ELSE CAST("),
        "{}",
        expression
    );
}
