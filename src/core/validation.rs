//! Configuration validation support.

use crate::error::ValidationError;

/// Trait for typed settings validation.
///
/// Implement this on settings types bound through
/// [`ConfigResolver::live_validated`](crate::core::ConfigResolver::live_validated):
/// an invalid initial value fails the bind, an invalid reloaded value is
/// rejected and the previous one kept.
///
/// # Examples
///
/// ```rust
/// use node_bootstrap::core::Validate;
/// use node_bootstrap::error::ValidationError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct ServiceSettings {
///     name: String,
///     port: u16,
/// }
///
/// impl Validate for ServiceSettings {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.name.is_empty() {
///             return Err(ValidationError::invalid_field("name", "must not be empty"));
///         }
///         if self.port == 0 {
///             return Err(ValidationError::invalid_field("port", "must not be 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
