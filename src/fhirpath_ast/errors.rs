use thiserror::Error;

/// Structural problems detected before translation starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AstValidationError {
    #[error("Empty identifier in expression '{0}'")]
    EmptyIdentifier(String),

    #[error("Invalid identifier '{name}' in expression '{expression}' (allowed: letters, digits, '_')")]
    InvalidIdentifier { name: String, expression: String },

    #[error("Invalid function name '{0}'")]
    InvalidFunctionName(String),

    #[error("Invalid variable '{0}' (expected $this, $index, $total or %name)")]
    InvalidVariable(String),

    #[error("Invalid type specifier '{type_name}' in '{expression}'")]
    InvalidTypeSpecifier {
        type_name: String,
        expression: String,
    },

    #[error("Malformed {literal_type} literal '{value}': {reason}")]
    MalformedLiteral {
        literal_type: &'static str,
        value: String,
        reason: String,
    },

    #[error("Expression nesting depth exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("Unrecognized node kind '{0}' in AST input")]
    UnrecognizedNodeKind(String),

    #[error("Malformed AST input: {0}")]
    MalformedInput(String),
}
