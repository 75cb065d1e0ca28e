//! Error types for Herald core

use thiserror::Error;

/// Main error type for voice session operations
#[derive(Debug, Error)]
pub enum HeraldError {
    /// The triggering member is not in any voice channel of the guild
    #[error("Channel not found: member {member_id} is not in a voice channel of guild {guild_id}")]
    ChannelNotFound {
        /// Guild that was scanned
        guild_id: u64,
        /// Member whose voice state was looked up
        member_id: u64,
    },

    /// Voice transport error (join, move, leave)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Audio encoding error
    #[error("Encode error: {0}")]
    Encode(String),

    /// Audio streaming error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using HeraldError
pub type Result<T> = std::result::Result<T, HeraldError>;

impl HeraldError {
    /// Create a channel-not-found error
    pub fn channel_not_found(guild_id: u64, member_id: u64) -> Self {
        HeraldError::ChannelNotFound {
            guild_id,
            member_id,
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        HeraldError::Transport(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        HeraldError::Encode(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        HeraldError::Stream(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        HeraldError::Config(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        HeraldError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_not_found_message() {
        let err = HeraldError::channel_not_found(1, 2);
        let msg = err.to_string();
        assert!(msg.contains("member 2"));
        assert!(msg.contains("guild 1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HeraldError = io.into();
        assert!(matches!(err, HeraldError::Io(_)));
    }
}
