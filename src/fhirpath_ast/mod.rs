//! FHIRPath abstract syntax tree consumed by the translator.
//!
//! Parsing FHIRPath text is done elsewhere; this module defines the tree, its
//! JSON wire form, and the structural validation that runs before translation.

pub mod ast;
pub mod errors;
pub mod validation;

pub use ast::{
    BinaryOperator, ExpressionNode, LiteralValue, Polarity, TypeOperator, TypeSpecifier,
    AST_VERSION, NODE_KINDS,
};
pub use errors::AstValidationError;
pub use validation::{parse_ast_json, validate_expression, DEFAULT_MAX_DEPTH};
