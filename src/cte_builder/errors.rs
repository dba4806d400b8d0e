use thiserror::Error;

/// Violations of the fragment contract found while assembling the query.
///
/// The translator never produces these for valid input; seeing one means a
/// fragment list was built or edited incorrectly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CteBuildError {
    #[error("No fragments to assemble.")]
    EmptyFragments,

    #[error("Duplicate CTE name: {0}")]
    DuplicateName(String),

    #[error("Dependency cycle between CTEs: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Expected exactly one terminal fragment but found {}: {}", .0.len(), .0.join(", "))]
    MultipleTerminals(Vec<String>),

    #[error("Fragment '{name}' has an unsupported shape: {reason}")]
    UnsupportedShape { name: String, reason: String },

    #[error("Fragment '{0}' requires unnesting but has no unnest source")]
    MissingUnnestSource(String),
}
