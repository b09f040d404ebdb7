//! Error types for the declarative crate

use thiserror::Error;

/// Errors raised while declaring or validating a resource graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A node with the same logical id was already declared
    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),

    /// A node, edge or output names a node that is not in the graph
    #[error("{context} references unknown resource '{id}'")]
    UnknownResource { context: String, id: String },

    /// An explicit edge from a node to itself
    #[error("resource '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// The dependency edges do not form a DAG
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A parameter or output was declared twice
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// A value was supplied for a parameter the graph does not declare
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A required parameter has neither a supplied value nor a default
    #[error("missing value for parameter '{0}'")]
    MissingParameter(String),

    /// A supplied value could not be parsed as the parameter's type
    #[error("invalid value '{value}' for parameter '{name}': expected {expected}")]
    InvalidParameter {
        name: String,
        value: String,
        expected: &'static str,
    },

    /// A value parsed but failed a declared constraint
    #[error("parameter '{name}' violates constraint: {constraint}")]
    ConstraintViolation { name: String, constraint: String },
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, Error>;
