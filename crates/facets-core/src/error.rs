//! Error taxonomy for facet composition, access and notification

use crate::value::Value;

/// Errors raised by the facets runtime
#[derive(Debug, thiserror::Error)]
pub enum FacetError {
    /// An assigned value was rejected by the facet's validator
    #[error("The '{name}' facet of a {class} instance must be {expected}, but a value of {value} was specified")]
    Validation {
        /// Class of the object being assigned
        class: String,
        /// Facet name
        name: String,
        /// The rejected value
        value: Value,
        /// Description of the accepted values
        expected: String,
    },

    /// Class composition found an illegal redefinition
    #[error("Schema conflict in class '{class}': {message}")]
    SchemaConflict {
        /// Class being composed
        class: String,
        /// What conflicted
        message: String,
    },

    /// Two members with the same name were declared in one class
    #[error("'{name}' is defined more than once in class '{class}'")]
    DuplicateDefinition {
        /// Class being composed
        class: String,
        /// Duplicated member name
        name: String,
    },

    /// A value-shaped handler cannot be resolved through the pattern's links
    #[error("Ambiguous listener '{pattern}': {message}")]
    AmbiguousListener {
        /// Listener pattern text
        pattern: String,
        /// Why resolution failed
        message: String,
    },

    /// A typed method's declared parameters do not match its callable
    #[error("Signature mismatch for '{name}': {message}")]
    Signature {
        /// Method name
        name: String,
        /// Mismatch description
        message: String,
    },

    /// A listener pattern could not be parsed
    #[error("{message} at column {column} of '{text}'")]
    PatternSyntax {
        /// Pattern text
        text: String,
        /// Zero-based column of the offending character
        column: usize,
        /// Parser message
        message: String,
    },

    /// The object has no facet with this name
    #[error("'{class}' object has no facet named '{name}'")]
    NoSuchFacet {
        /// Class of the object
        class: String,
        /// Requested name
        name: String,
    },

    /// The facet cannot be assigned
    #[error("The '{name}' facet of a {class} instance is read only")]
    ReadOnly {
        /// Class of the object
        class: String,
        /// Facet name
        name: String,
    },

    /// A delegate facet could not reach its target
    #[error("Delegate facet '{name}': {message}")]
    Delegate {
        /// Delegating facet
        name: String,
        /// Failure description
        message: String,
    },

    /// A change handler failed
    #[error("Exception occurred in facet notification handler for '{name}': {message}")]
    Notification {
        /// Facet whose change was being delivered
        name: String,
        /// Failure description
        message: String,
    },

    /// No dispatch strategy is registered under this name
    #[error("Unknown dispatch mode: {0}")]
    UnknownDispatch(String),

    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading configuration failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl FacetError {
    /// Returns true for validation failures
    pub fn is_validation(&self) -> bool {
        matches!(self, FacetError::Validation { .. })
    }
}

/// Facets operation result
pub type FacetResult<T> = Result<T, FacetError>;
