//! NewType wrappers for identifiers and time.
//!
//! - [`Timestamp`] - Unix millisecond timestamps
//! - [`ChannelId`] - Realtime subscription channel names
//! - [`RequestId`] - Correlation ids for request/reply messages and queued commands

mod channel;
mod request_id;
mod timestamp;

pub use channel::ChannelId;
pub use request_id::RequestId;
pub use timestamp::Timestamp;

/// Validation error for `NewType` construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Timestamp value is invalid
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// Channel name is empty
    #[error("channel name cannot be empty")]
    EmptyChannel,

    /// Channel name contains whitespace or control characters
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    /// Request id is empty
    #[error("request id cannot be empty")]
    EmptyRequestId,
}
