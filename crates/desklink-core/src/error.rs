use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `BridgeError` values.
///
/// Single error taxonomy shared by every bridge component: transport-level
/// classification happens once in the API client and downstream code only
/// ever matches on these variants.
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned status {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl BridgeError {
    /// Returns true for failures a multi-source or multi-strategy caller may
    /// skip past (the next source/strategy is still attempted).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::BridgeError;

    #[test]
    fn unit_recoverable_classification_matches_taxonomy() {
        assert!(BridgeError::Transport("timeout".to_string()).is_recoverable());
        assert!(BridgeError::Remote {
            status: 502,
            message: "bad gateway".to_string(),
        }
        .is_recoverable());
        assert!(!BridgeError::Config("missing token".to_string()).is_recoverable());
        assert!(!BridgeError::Validation("bad repo".to_string()).is_recoverable());
        assert!(!BridgeError::Unauthorized("signature".to_string()).is_recoverable());
    }

    #[test]
    fn unit_remote_error_renders_status_and_message() {
        let error = BridgeError::Remote {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(error.to_string(), "remote returned status 404: Not Found");
    }
}
