//! Assembly of translator output into one statement.

use fhirpath_sql::cte_builder::{CteBuildError, CteBuilder};
use fhirpath_sql::fhirpath_ast::{BinaryOperator, ExpressionNode};
use fhirpath_sql::sql_dialect::{create_dialect, DialectKind};
use fhirpath_sql::translator::{SqlFragment, Translator};
use fhirpath_sql::TranslatorConfig;
use test_case::test_case;

fn expressions() -> Vec<ExpressionNode> {
    vec![
        ExpressionNode::dotted("Patient.name.given")
            .call("first", vec![])
            .call("upper", vec![]),
        ExpressionNode::dotted("Patient.name").call("count", vec![]),
        ExpressionNode::dotted("Patient.name").call(
            "exists",
            vec![ExpressionNode::binary(
                BinaryOperator::Equal,
                ExpressionNode::identifier("family"),
                ExpressionNode::string("Smith"),
            )],
        ),
        ExpressionNode::dotted("Patient.name.given").call("join", vec![ExpressionNode::string(", ")]),
        ExpressionNode::dotted("Patient.birthDate").is_type("Date"),
        ExpressionNode::dotted("Patient.name.family")
            .call("first", vec![])
            .call(
                "substring",
                vec![ExpressionNode::integer(1), ExpressionNode::integer(2)],
            ),
    ]
}

fn config(dialect: DialectKind, inline: bool) -> TranslatorConfig {
    TranslatorConfig {
        dialect,
        inline_scalar_fragments: inline,
        ..Default::default()
    }
}

/// Every CTE is defined before the first place its columns are read.
fn assert_no_forward_references(sql: &str, fragments: &[SqlFragment]) {
    for fragment in fragments {
        let definition = format!("{} AS (", fragment.name);
        let reference = format!("{}.", fragment.name);
        if let Some(defined_at) = sql.find(&definition) {
            let first_use = sql.find(&reference).unwrap_or(usize::MAX);
            assert!(
                defined_at < first_use,
                "{} is read before it is defined:\n{}",
                fragment.name,
                sql
            );
        }
    }
}

#[test_case(DialectKind::DuckDb, false ; "duckdb")]
#[test_case(DialectKind::PostgreSql, false ; "postgresql")]
#[test_case(DialectKind::DuckDb, true ; "duckdb inlined")]
#[test_case(DialectKind::PostgreSql, true ; "postgresql inlined")]
fn test_assembly_never_references_forward(dialect: DialectKind, inline: bool) {
    let config = config(dialect, inline);
    let translator = Translator::with_config(create_dialect(dialect), config.clone());
    let builder = CteBuilder::new(&config);

    for ast in expressions() {
        let fragments = translator.translate(&ast).unwrap();
        let query = builder.assemble(&fragments).unwrap();
        assert!(query.sql.starts_with("WITH "), "{}", query.sql);
        assert_eq!(query.source_tables, vec!["patient".to_string()]);
        assert_no_forward_references(&query.sql, &fragments);

        let terminal = &fragments.last().unwrap().name;
        assert!(query
            .sql
            .ends_with(&format!("SELECT {t}.id, {t}.value\nFROM {t}", t = terminal)));
    }
}

#[test]
fn test_shuffled_fragments_are_reordered() {
    let translator = Translator::new(create_dialect(DialectKind::DuckDb));
    let ast = ExpressionNode::dotted("Patient.name.given")
        .call("first", vec![])
        .call("upper", vec![]);
    let fragments = translator.translate(&ast).unwrap();
    let mut shuffled = fragments.clone();
    shuffled.reverse();

    let builder = CteBuilder::new(&TranslatorConfig::default());
    let ordered = builder.assemble(&fragments).unwrap();
    let reordered = builder.assemble(&shuffled).unwrap();
    assert_eq!(ordered.sql, reordered.sql);
}

#[test]
fn test_cyclic_fragments_are_rejected() {
    let fragments = vec![
        SqlFragment::new("a", "b.value", "b"),
        SqlFragment::new("b", "a.value", "a"),
        SqlFragment::new("c", "b.value", "b"),
    ];
    let err = CteBuilder::new(&TranslatorConfig::default())
        .assemble(&fragments)
        .unwrap_err();
    assert!(matches!(err, CteBuildError::Cycle(_)), "{:?}", err);
}

#[test]
fn test_two_terminals_are_rejected() {
    let fragments = vec![
        SqlFragment::new("a", "patient.resource", "patient"),
        SqlFragment::new("b", "a.value", "a"),
        SqlFragment::new("c", "a.value", "a"),
    ];
    assert_eq!(
        CteBuilder::new(&TranslatorConfig::default()).assemble(&fragments),
        Err(CteBuildError::MultipleTerminals(vec![
            "b".to_string(),
            "c".to_string()
        ]))
    );
}

#[test]
fn test_inlining_reduces_the_number_of_ctes() {
    let ast = ExpressionNode::dotted("Patient.name.given")
        .call("first", vec![])
        .call("upper", vec![]);
    let translator = Translator::new(create_dialect(DialectKind::DuckDb));
    let fragments = translator.translate(&ast).unwrap();

    let plain = CteBuilder::new(&TranslatorConfig::default())
        .assemble(&fragments)
        .unwrap();
    let inlined = CteBuilder::new(&TranslatorConfig::default())
        .with_inlining(true)
        .assemble(&fragments)
        .unwrap();

    let count = |sql: &str| sql.matches(" AS (\n").count();
    assert_eq!(count(&plain.sql), fragments.len());
    assert!(count(&inlined.sql) < count(&plain.sql));
    assert!(inlined.sql.contains("upper("));
    assert_eq!(plain.source_tables, inlined.source_tables);
}
