//! Error handling for the chat relay

use std::fmt;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat relay error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Socket-level I/O errors
    Network(String),
    /// A peer connection is gone or unusable
    Connection(String),
    /// Configuration errors, including failure to bind the listener
    Config(String),
    /// Timeout error
    Timeout(String),
    /// A configured limit refused the request, e.g. the connection cap
    ResourceLimit(String),
    /// Server internal error
    Internal(String),
}

impl ChatError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            ChatError::Network(_) => 1000,
            ChatError::Connection(_) => 1001,
            ChatError::Config(_) => 1002,
            ChatError::Timeout(_) => 1003,
            ChatError::ResourceLimit(_) => 1004,
            ChatError::Internal(_) => 1005,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            ChatError::Network(msg) => msg,
            ChatError::Connection(msg) => msg,
            ChatError::Config(msg) => msg,
            ChatError::Timeout(msg) => msg,
            ChatError::ResourceLimit(msg) => msg,
            ChatError::Internal(msg) => msg,
        }
    }

    pub fn network<T: Into<String>>(msg: T) -> Self {
        ChatError::Network(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ChatError::Connection(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ChatError::Config(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        ChatError::Timeout(msg.into())
    }

    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        ChatError::ResourceLimit(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ChatError::Internal(msg.into())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Network(msg) => write!(f, "Network error: {}", msg),
            ChatError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ChatError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ChatError::ResourceLimit(msg) => write!(f, "Resource limit exceeded: {}", msg),
            ChatError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Network(format!("IO error: {}", err))
    }
}

impl From<std::net::AddrParseError> for ChatError {
    fn from(err: std::net::AddrParseError) -> Self {
        ChatError::Config(format!("Invalid address: {}", err))
    }
}
