//! Configuration traits.

use crate::error::ConfigError;

/// Trait for types that can be validated.
///
/// # Example
///
/// ```rust
/// use tether_core::config::Validatable;
/// use tether_core::error::ConfigError;
///
/// struct ProbeConfig {
///     interval_ms: u64,
/// }
///
/// impl Validatable for ProbeConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.interval_ms == 0 {
///             return Err(ConfigError::invalid_value("interval_ms", "Must be positive"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(ProbeConfig { interval_ms: 0 }.validate().is_err());
/// ```
pub trait Validatable {
    /// Validates the configuration.
    ///
    /// Returns `Ok(())` if the configuration is valid, or a `ConfigError`
    /// describing the first problem found.
    fn validate(&self) -> Result<(), ConfigError>;
}
