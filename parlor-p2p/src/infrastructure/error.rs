use std::fmt;

/// Transport-layer failures, split into the two classes the retry policy
/// cares about: recoverable (retry the connect) and fatal (surface and tear
/// down).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transient network or signalling-server trouble.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The signalling server did not assign us an address in time.
    #[error("timed out waiting for a transport address")]
    SignallingTimeout,

    /// The room identifier is not something the signalling server accepts.
    #[error("invalid room: {0}")]
    InvalidRoom(String),

    /// The remote peer is gone or was never there.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The runtime lacks WebRTC support.
    #[error("webrtc unsupported: {0}")]
    Unsupported(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether a connect attempt hitting this error is worth retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_) | TransportError::SignallingTimeout
        )
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_recoverable() {
            ErrorClass::Recoverable
        } else {
            ErrorClass::Fatal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Recoverable,
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Recoverable => write!(f, "recoverable"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TransportError::ConnectionFailed("reset".into()).is_recoverable());
        assert!(TransportError::SignallingTimeout.is_recoverable());
        assert!(!TransportError::InvalidRoom("x".into()).is_recoverable());
        assert!(!TransportError::PeerUnavailable("y".into()).is_recoverable());
        assert!(!TransportError::Unsupported("no webrtc".into()).is_recoverable());
    }

    #[test]
    fn test_class_display() {
        assert_eq!(
            TransportError::SignallingTimeout.class().to_string(),
            "recoverable"
        );
        assert_eq!(
            TransportError::Unsupported("x".into()).class().to_string(),
            "fatal"
        );
    }
}
