use thiserror::Error;

/// Failure kinds raised by the room manager, messaging engine and system
/// message injector. The HTTP and realtime layers translate these into their
/// own wire formats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Too many messages, slow down")]
    RateLimited,

    #[error("Chat room is closed")]
    RoomClosed,

    /// Store or runtime failure. The detail is for logs only.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// What a missing room and a room the caller is not part of both
    /// report, so outsiders cannot tell the two apart.
    pub fn room_not_found() -> Self {
        Self::NotFound("Chat room".to_string())
    }

    /// Message safe to show to a client. Internal details are replaced.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Malformed identity token")]
    Malformed,

    #[error("Identity token expired")]
    Expired,

    #[error("Invalid identity token signature")]
    BadSignature,

    #[error("Invalid auth server key")]
    InvalidServerKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = ChatError::Internal("disk I/O error at page 7".into());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_validation_message_is_public() {
        let err = ChatError::validation("message", "Message cannot be empty");
        assert_eq!(err.public_message(), "Message cannot be empty");
        assert_eq!(ChatError::room_not_found().to_string(), "Chat room not found");
    }
}
