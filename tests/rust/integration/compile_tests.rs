//! End-to-end compilation from AST to SQL.

use fhirpath_sql::fhirpath_ast::{AstValidationError, ExpressionNode};
use fhirpath_sql::sql_dialect::DialectKind;
use fhirpath_sql::translator::{TranslationError, Translator};
use fhirpath_sql::{compile, compile_json, CompileError, OutputMode, TranslatorConfig};
use test_case::test_case;

fn config(dialect: DialectKind) -> TranslatorConfig {
    TranslatorConfig {
        dialect,
        ..Default::default()
    }
}

fn first_given_upper() -> ExpressionNode {
    ExpressionNode::dotted("Patient.name.given")
        .call("first", vec![])
        .call("upper", vec![])
}

#[test_case(DialectKind::DuckDb, "to_json(json_extract(patient.resource, '$.name[*]'))" ; "duckdb")]
#[test_case(DialectKind::PostgreSql, "jsonb_path_query_array(patient.resource, '$.name[*]')" ; "postgresql")]
fn test_first_given_name_upper(dialect: DialectKind, extraction: &str) {
    let config = config(dialect);
    let fragments = Translator::from_config(&config)
        .translate(&first_given_upper())
        .unwrap();
    assert!(fragments.len() >= 2);

    let query = compile(&first_given_upper(), &config).unwrap();
    assert!(query.sql.starts_with("WITH "));
    assert_eq!(query.sql.matches("WITH ").count(), 1);
    assert!(query.sql.contains(extraction), "{}", query.sql);
    assert!(query.sql.contains("upper("));
    assert_eq!(query.source_tables, vec!["patient".to_string()]);
    assert!(query.warnings.is_empty());
}

#[test_case(DialectKind::DuckDb ; "duckdb")]
#[test_case(DialectKind::PostgreSql ; "postgresql")]
fn test_retranslation_is_stable(dialect: DialectKind) {
    let translator = Translator::from_config(&config(dialect));
    let ast = ExpressionNode::dotted("Patient.name")
        .call("where", vec![ExpressionNode::dotted("given").call("exists", vec![])])
        .call("count", vec![]);
    let first = translator.translate(&ast).unwrap();
    let second = translator.translate(&ast).unwrap();
    assert_eq!(first, second);

    let config = config(dialect);
    assert_eq!(
        compile(&ast, &config).unwrap().sql,
        compile(&ast, &config).unwrap().sql
    );
}

#[test]
fn test_compile_json_input() {
    let json = r#"{
        "kind": "function_call",
        "name": "count",
        "base": {
            "kind": "path",
            "name": "name",
            "base": {"kind": "identifier", "name": "Patient"}
        }
    }"#;
    let query = compile_json(json, &TranslatorConfig::default()).unwrap();
    assert!(query.sql.contains("json_array_length("));
}

#[test]
fn test_unknown_node_kind_fails_compilation() {
    let json = r#"{"kind": "path", "base": {"kind": "where_clause"}, "name": "x"}"#;
    assert!(matches!(
        compile_json(json, &TranslatorConfig::default()),
        Err(CompileError::Validation(AstValidationError::UnrecognizedNodeKind(kind))) if kind == "where_clause"
    ));
}

#[test]
fn test_validation_runs_before_translation() {
    let ast = ExpressionNode::identifier("Patient").path("");
    assert!(matches!(
        compile(&ast, &TranslatorConfig::default()),
        Err(CompileError::Validation(AstValidationError::EmptyIdentifier(_)))
    ));
}

#[test]
fn test_semantic_errors_carry_the_path() {
    let unknown_element = ExpressionNode::dotted("Patient.nickname");
    match compile(&unknown_element, &TranslatorConfig::default()) {
        Err(CompileError::Translation(TranslationError::UnresolvableIdentifier { name, path })) => {
            assert_eq!(name, "nickname");
            assert_eq!(path, "Patient");
        }
        other => panic!("expected an unresolvable identifier, got {:?}", other),
    }

    let unknown_function = ExpressionNode::dotted("Patient.name").call("frobnicate", vec![]);
    assert!(matches!(
        compile(&unknown_function, &TranslatorConfig::default()),
        Err(CompileError::Translation(TranslationError::UnknownFunction { function, .. })) if function == "frobnicate"
    ));
}

#[test]
fn test_unknown_type_warns_and_never_matches() {
    let ast = ExpressionNode::dotted("Patient.gender").is_type("Colour");
    let query = compile(&ast, &TranslatorConfig::default()).unwrap();
    assert_eq!(query.warnings.len(), 1);
    assert!(query.warnings[0].contains("Unknown type 'Colour'"));
    assert!(query.sql.contains("THEN NULL ELSE FALSE END"), "{}", query.sql);
}

#[test]
fn test_rows_output_expands_items() {
    let config = TranslatorConfig {
        output_mode: OutputMode::Rows,
        ..Default::default()
    };
    let query = compile(&ExpressionNode::dotted("Patient.name.given"), &config).unwrap();
    assert!(query.sql.contains("CROSS JOIN LATERAL (SELECT unnest("), "{}", query.sql);
}

#[test]
fn test_resource_table_and_id_column_overrides() {
    let config = TranslatorConfig {
        dialect: DialectKind::PostgreSql,
        resource_table: Some("fhir_patient".to_string()),
        id_column: "pid".to_string(),
        resource_column: "doc".to_string(),
        ..Default::default()
    };
    let query = compile(&ExpressionNode::dotted("Patient.gender"), &config).unwrap();
    assert_eq!(query.source_tables, vec!["fhir_patient".to_string()]);
    assert!(query.sql.contains("SELECT fhir_patient.pid AS id, "), "{}", query.sql);
    assert!(query.sql.contains("fhir_patient.doc"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = TranslatorConfig {
        cte_prefix: "bad prefix".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        compile(&first_given_upper(), &config),
        Err(CompileError::Config(_))
    ));
}

#[test]
fn test_custom_cte_prefix() {
    let config = TranslatorConfig {
        cte_prefix: "q".to_string(),
        ..Default::default()
    };
    let query = compile(&first_given_upper(), &config).unwrap();
    assert!(query.sql.starts_with("WITH q_1 AS ("), "{}", query.sql);
}
