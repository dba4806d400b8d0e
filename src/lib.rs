//! fhirpath-sql - FHIRPath to SQL compilation
//!
//! This crate compiles FHIRPath expressions, given as an AST, into a single
//! SQL statement evaluated over a table of FHIR resources:
//! - AST definition, JSON form and structural validation
//! - Translation into SQL fragments, with FHIRPath semantics decided once
//! - Thin DuckDB and PostgreSQL dialects for the syntax
//! - Assembly of the fragments into one `WITH ... SELECT` statement

use thiserror::Error;
use validator::Validate;

pub mod utils;

pub mod config;
pub mod cte_builder;
pub mod fhirpath_ast;
pub mod sql_dialect;
pub mod translator;
pub mod type_registry;

pub use config::{ConfigError, OutputMode, TranslatorConfig};
pub use cte_builder::{CompiledQuery, CteBuildError, CteBuilder};
pub use fhirpath_ast::{parse_ast_json, validate_expression, AstValidationError, ExpressionNode};
pub use sql_dialect::{create_dialect, Dialect, DialectKind};
pub use translator::{SqlFragment, TranslationError, Translator};

/// Any failure of the [`compile`] pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid AST: {0}")]
    Validation(#[from] AstValidationError),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("Internal error while assembling the query: {0}")]
    CteBuild(#[from] CteBuildError),
}

/// Compile an expression into one SQL statement.
pub fn compile(ast: &ExpressionNode, config: &TranslatorConfig) -> Result<CompiledQuery, CompileError> {
    config.validate().map_err(ConfigError::from)?;
    validate_expression(ast, config.max_expression_depth)?;

    let translator = Translator::from_config(config);
    let mut ctx = translator.new_context(ast)?;
    let fragments = translator.translate_with_context(ast, &mut ctx)?;

    let mut query = CteBuilder::new(config).assemble(&fragments)?;
    query.warnings = ctx.take_warnings();
    Ok(query)
}

/// Compile an expression given in its JSON form.
pub fn compile_json(json: &str, config: &TranslatorConfig) -> Result<CompiledQuery, CompileError> {
    let ast = parse_ast_json(json)?;
    compile(&ast, config)
}
