//! JSON wire form of the AST and the structural checks run before translation.

use fhirpath_sql::fhirpath_ast::{
    parse_ast_json, validate_expression, AstValidationError, ExpressionNode, DEFAULT_MAX_DEPTH,
};

#[test]
fn test_parse_method_chain() {
    let json = r#"{
        "kind": "function_call",
        "name": "upper",
        "base": {
            "kind": "function_call",
            "name": "first",
            "base": {
                "kind": "path",
                "name": "given",
                "base": {
                    "kind": "path",
                    "name": "name",
                    "base": {"kind": "identifier", "name": "Patient"}
                }
            }
        }
    }"#;
    let expected = ExpressionNode::dotted("Patient.name.given")
        .call("first", vec![])
        .call("upper", vec![]);
    assert_eq!(parse_ast_json(json).unwrap(), expected);
}

#[test]
fn test_parse_literals_and_operators() {
    let json = r#"{
        "kind": "binary_operation",
        "operator": "add",
        "left": {"kind": "literal", "value": {"type": "integer", "value": 2}},
        "right": {"kind": "literal", "value": {"type": "decimal", "value": "3.50"}}
    }"#;
    let expected = ExpressionNode::binary(
        fhirpath_sql::fhirpath_ast::BinaryOperator::Add,
        ExpressionNode::integer(2),
        ExpressionNode::decimal("3.50"),
    );
    assert_eq!(parse_ast_json(json).unwrap(), expected);
}

#[test]
fn test_serialized_tree_parses_back() {
    let ast = ExpressionNode::dotted("Observation.value").as_type("Quantity");
    let json = serde_json::to_string(&ast).unwrap();
    assert_eq!(parse_ast_json(&json).unwrap(), ast);
}

#[test]
fn test_unknown_node_kind_is_rejected() {
    let json = r#"{"kind": "lambda", "body": []}"#;
    assert_eq!(
        parse_ast_json(json),
        Err(AstValidationError::UnrecognizedNodeKind("lambda".to_string()))
    );
}

#[test]
fn test_malformed_json_is_rejected() {
    assert!(matches!(
        parse_ast_json("{\"kind\": "),
        Err(AstValidationError::MalformedInput(_))
    ));
}

#[test]
fn test_empty_identifier_is_rejected() {
    let ast = ExpressionNode::identifier("Patient").path("");
    assert!(matches!(
        validate_expression(&ast, DEFAULT_MAX_DEPTH),
        Err(AstValidationError::EmptyIdentifier(_))
    ));
}

#[test]
fn test_depth_limit() {
    let ast = ExpressionNode::dotted("Patient.name.given")
        .call("first", vec![])
        .call("upper", vec![]);
    assert!(validate_expression(&ast, DEFAULT_MAX_DEPTH).is_ok());
    assert_eq!(
        validate_expression(&ast, 3),
        Err(AstValidationError::DepthExceeded { limit: 3 })
    );
}
