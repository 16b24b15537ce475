//! Configuration validation utilities.

use crate::error::ConfigError;

/// Result type for validation operations.
pub type ValidationResult = Result<(), ConfigError>;

/// Context for validation operations.
///
/// Tracks the current path in the configuration tree so errors read like
/// `realtime.max_reconnect_attempts`.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    path: Vec<String>,
    errors: Vec<ConfigError>,
}

impl ValidationContext {
    /// Creates a new validation context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a new section in the configuration.
    pub fn enter(&mut self, section: impl Into<String>) {
        self.path.push(section.into());
    }

    /// Exits the current section.
    pub fn exit(&mut self) {
        self.path.pop();
    }

    /// Returns the current path as a dot-separated string.
    #[must_use]
    pub fn current_path(&self) -> String {
        self.path.join(".")
    }

    /// Adds a validation error.
    pub fn add_error(&mut self, error: ConfigError) {
        self.errors.push(error);
    }

    /// Returns true if there are no validation errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the collected validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// Consumes the context and returns the first error, if any.
    pub fn into_result(self) -> ValidationResult {
        self.errors.into_iter().next().map_or(Ok(()), Err)
    }

    /// Creates a missing field error with the current path context.
    #[must_use]
    pub fn missing_field(&self, field: impl Into<String>) -> ConfigError {
        let section = if self.path.is_empty() {
            None
        } else {
            Some(self.current_path())
        };
        ConfigError::MissingField {
            field: field.into(),
            section,
        }
    }

    /// Creates an invalid value error with the current path context.
    #[must_use]
    pub fn invalid_value(
        &self,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> ConfigError {
        let field_name = field.into();
        let full_field = if self.path.is_empty() {
            field_name
        } else {
            format!("{}.{}", self.current_path(), field_name)
        };
        ConfigError::InvalidValue {
            field: full_field,
            reason: reason.into(),
        }
    }
}

/// Fluent validator over a [`ValidationContext`].
#[derive(Debug)]
pub struct Validator<'a> {
    ctx: &'a mut ValidationContext,
}

impl<'a> Validator<'a> {
    /// Creates a new validator with the given context.
    pub fn new(ctx: &'a mut ValidationContext) -> Self {
        Self { ctx }
    }

    /// Validates that a string field is not empty.
    pub fn require_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.ctx.add_error(self.ctx.missing_field(field));
        }
        self
    }

    /// Validates that a numeric value is within an inclusive range.
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        field: &str,
        value: &T,
        min: &T,
        max: &T,
    ) -> &mut Self {
        if value < min || value > max {
            self.ctx.add_error(self.ctx.invalid_value(
                field,
                format!("Value {value} must be between {min} and {max}"),
            ));
        }
        self
    }

    /// Validates that a numeric value is positive.
    pub fn positive<T: PartialOrd + Default + std::fmt::Display>(
        &mut self,
        field: &str,
        value: &T,
    ) -> &mut Self {
        if *value <= T::default() {
            self.ctx.add_error(
                self.ctx
                    .invalid_value(field, format!("Value {value} must be positive")),
            );
        }
        self
    }

    /// Validates using a custom predicate.
    pub fn custom<F>(&mut self, field: &str, predicate: F, error_msg: &str) -> &mut Self
    where
        F: FnOnce() -> bool,
    {
        if !predicate() {
            self.ctx.add_error(self.ctx.invalid_value(field, error_msg));
        }
        self
    }

    /// Validates an `http://` or `https://` URL.
    pub fn http_url(&mut self, field: &str, value: &str) -> &mut Self {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            self.ctx.add_error(
                self.ctx
                    .invalid_value(field, "Must be an http:// or https:// URL"),
            );
        }
        self
    }

    /// Returns the validation result.
    pub fn result(&self) -> ValidationResult {
        self.ctx.errors().first().cloned().map_or(Ok(()), Err)
    }
}

/// Environment variable helper for applying overrides.
///
/// Unset variables and unparsable values leave the target untouched.
pub struct EnvOverride;

impl EnvOverride {
    /// Applies an environment variable override to a string value.
    pub fn apply_string(var_name: &str, target: &mut String) {
        if let Ok(value) = std::env::var(var_name) {
            *target = value;
        }
    }

    /// Applies an environment variable override to an optional string value.
    pub fn apply_optional_string(var_name: &str, target: &mut Option<String>) {
        if let Ok(value) = std::env::var(var_name) {
            *target = Some(value);
        }
    }

    /// Applies an environment variable override to a numeric value.
    pub fn apply_number<T: std::str::FromStr>(var_name: &str, target: &mut T) {
        if let Ok(value) = std::env::var(var_name)
            && let Ok(parsed) = value.parse()
        {
            *target = parsed;
        }
    }

    /// Applies an environment variable override to a comma-separated list.
    pub fn apply_list(var_name: &str, target: &mut Vec<String>) {
        if let Ok(value) = std::env::var(var_name) {
            *target = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_context_path() {
        let mut ctx = ValidationContext::new();
        assert_eq!(ctx.current_path(), "");

        ctx.enter("cache");
        ctx.enter("routes");
        assert_eq!(ctx.current_path(), "cache.routes");

        ctx.exit();
        assert_eq!(ctx.current_path(), "cache");
    }

    #[test]
    fn test_invalid_value_is_path_qualified() {
        let mut ctx = ValidationContext::new();
        ctx.enter("realtime");
        Validator::new(&mut ctx).positive("heartbeat_interval_ms", &0u64);

        match ctx.into_result() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "realtime.heartbeat_interval_ms");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validator_in_range() {
        let mut ctx = ValidationContext::new();
        let mut validator = Validator::new(&mut ctx);
        validator.in_range("max_reconnect_attempts", &5u32, &1, &20);
        assert!(validator.result().is_ok());

        validator.in_range("max_reconnect_attempts", &0u32, &1, &20);
        assert!(validator.result().is_err());
    }

    #[test]
    fn test_validator_http_url() {
        let mut ctx = ValidationContext::new();
        Validator::new(&mut ctx)
            .http_url("base_url", "https://panel.example.com")
            .require_non_empty("storage_dir", ".tether");
        assert!(ctx.is_valid());

        Validator::new(&mut ctx).http_url("base_url", "ftp://panel");
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn test_env_override_unset_leaves_value() {
        let mut value = vec!["console".to_string()];
        EnvOverride::apply_list("TETHER_TEST_UNSET_LIST_4711", &mut value);
        assert_eq!(value, vec!["console".to_string()]);
    }
}
