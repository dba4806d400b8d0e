use thiserror::Error;

use crate::fhirpath_ast::AstValidationError;

/// Semantic errors raised while translating an AST into SQL fragments.
///
/// Translation never guesses: any of these aborts the whole expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    #[error("Unrecognized AST node kind '{0}'")]
    UnrecognizedNodeKind(String),

    #[error("Invalid expression: {0}")]
    Validation(#[from] AstValidationError),

    #[error("Function '{function}' expects {expected} argument(s) but got {actual} at '{path}'")]
    WrongArity {
        function: String,
        expected: String,
        actual: usize,
        path: String,
    },

    #[error("Unknown function '{function}' at '{path}'")]
    UnknownFunction { function: String, path: String },

    #[error("Cannot resolve '{name}' on '{path}'")]
    UnresolvableIdentifier { name: String, path: String },

    #[error("Invalid operand for '{operation}' at '{path}': {reason}")]
    InvalidOperand {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("Unsupported {literal_type} literal '{value}': {reason}")]
    UnsupportedLiteral {
        literal_type: &'static str,
        value: String,
        reason: String,
    },

    #[error("Expression addresses resource type '{found}' but is evaluated against '{expected}'")]
    ResourceTypeMismatch { expected: String, found: String },

    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Cannot determine the resource type: the expression does not start with one and none is configured")]
    MissingResourceType,
}

impl TranslationError {
    pub(crate) fn invalid_operand(
        operation: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TranslationError::InvalidOperand {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}
