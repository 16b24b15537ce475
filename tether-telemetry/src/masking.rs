//! Sensitive data masking for logs.
//!
//! Session tokens travel in `Authorization` headers, in the `authenticate` frame and
//! in the persisted credential file. All of them are masked before output.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Patterns for detecting sensitive data.
static PATTERNS: LazyLock<Vec<SensitivePattern>> = LazyLock::new(|| {
    vec![
        // Bearer credentials in headers or error messages
        SensitivePattern {
            regex: Regex::new(r"(?i)bearer\s+([a-zA-Z0-9._~+/=-]{8,})").unwrap(),
            group: 1,
        },
        // JSON or key=value token fields, including the persisted session key
        SensitivePattern {
            regex: Regex::new(
                r#"(?i)"?(token|webui_session_token|session_token|access_token)"?\s*[:=]\s*"?([^\s",}]{4,})"?"#,
            )
            .unwrap(),
            group: 2,
        },
        // Passwords
        SensitivePattern {
            regex: Regex::new(r#"(?i)"?(password|passwd|pwd)"?\s*[:=]\s*"?([^\s",}]{4,})"?"#)
                .unwrap(),
            group: 2,
        },
        // JWTs anywhere
        SensitivePattern {
            regex: Regex::new(r"eyJ[a-zA-Z0-9_-]*\.eyJ[a-zA-Z0-9_-]*\.[a-zA-Z0-9_-]*").unwrap(),
            group: 0,
        },
    ]
});

struct SensitivePattern {
    regex: Regex,
    group: usize,
}

/// Masks sensitive data in strings.
#[derive(Debug, Clone)]
pub struct SensitiveDataMasker {
    /// Minimum length of a value that keeps its edges visible
    min_length: usize,
    /// Characters shown at the start of a masked value
    show_start: usize,
    /// Characters shown at the end of a masked value
    show_end: usize,
}

impl Default for SensitiveDataMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl SensitiveDataMasker {
    /// Create a new masker with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_length: 8,
            show_start: 3,
            show_end: 3,
        }
    }

    /// Mask a known sensitive value.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_telemetry::masking::SensitiveDataMasker;
    ///
    /// let masker = SensitiveDataMasker::new();
    /// assert_eq!(masker.mask_value("abcdefghijklmnop"), "abc***nop");
    /// assert_eq!(masker.mask_value("short"), "*****");
    /// ```
    #[must_use]
    pub fn mask_value(&self, value: &str) -> String {
        let len = value.chars().count();
        if len < self.min_length {
            return "*".repeat(len.max(3));
        }

        let start: String = value.chars().take(self.show_start).collect();
        let end: String = value.chars().skip(len - self.show_end).collect();
        format!("{start}***{end}")
    }

    /// Mask every sensitive value found in a string.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_telemetry::masking::SensitiveDataMasker;
    ///
    /// let masker = SensitiveDataMasker::new();
    /// let masked = masker.mask_string(r#"{"type":"authenticate","token":"s3cr3t-session-value"}"#);
    /// assert!(!masked.contains("s3cr3t-session-value"));
    /// ```
    #[must_use]
    pub fn mask_string<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = Cow::Borrowed(input);

        for pattern in PATTERNS.iter() {
            if !pattern.regex.is_match(&result) {
                continue;
            }
            let replaced = pattern
                .regex
                .replace_all(&result, |caps: &Captures<'_>| self.mask_capture(caps, pattern.group))
                .into_owned();
            result = Cow::Owned(replaced);
        }

        result
    }

    /// Check if a string contains sensitive patterns.
    #[must_use]
    pub fn contains_sensitive(&self, input: &str) -> bool {
        PATTERNS.iter().any(|p| p.regex.is_match(input))
    }

    fn mask_capture(&self, caps: &Captures<'_>, group: usize) -> String {
        let whole = &caps[0];
        match (caps.get(0), caps.get(group)) {
            (Some(outer), Some(inner)) if group != 0 => {
                let start = inner.start() - outer.start();
                let end = inner.end() - outer.start();
                format!(
                    "{}{}{}",
                    &whole[..start],
                    self.mask_value(inner.as_str()),
                    &whole[end..]
                )
            }
            _ => self.mask_value(whole),
        }
    }
}

/// A wrapper for sensitive values that masks them in Display/Debug.
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a value as sensitive.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Get the inner value.
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume and return the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> std::fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}
