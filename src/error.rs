//! Error types for node-bootstrap.

use std::fmt;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required source failed to load, or no sources were given.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// The merged settings could not be mapped onto the requested type.
    #[error("Failed to bind configuration: {0}")]
    BindError(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Watching a source failed or the watch could not be started.
    #[error("Watch error: {0}")]
    WatchError(String),

    /// Configuration source does not support watching.
    #[error("Configuration source does not support watching")]
    WatchNotSupported,

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse a configuration payload.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

/// Errors raised while publishing or withdrawing the node's registry presence.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No usable network address could be discovered for this node.
    #[error("Failed to resolve a reachable address: {0}")]
    AddressResolution(String),

    /// The registry was unreachable or rejected the service entry.
    #[error("Service registration failed: {0}")]
    Registration(String),

    /// The health-check entry could not be attached.
    #[error("Health check registration failed: {0}")]
    HealthCheckAttach(String),

    /// Withdrawing an entry failed during shutdown.
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// The registry could not be reached.
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    /// The registry answered with a non-success status.
    #[error("Registry rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP-style status code
        status: u16,
        /// Body or reason returned by the registry
        message: String,
    },

    /// An entry with the same identity is already registered.
    #[error("Registration conflict: {0}")]
    Conflict(String),

    /// The operation is not valid in the coordinator's current state.
    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),

    /// Registry settings could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that abort node startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Configuration could not be resolved or bound.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The node could not be made discoverable.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Validation error for configuration validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}
