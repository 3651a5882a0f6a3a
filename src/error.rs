//! Error taxonomy for the redirect rule engine.
//!
//! The query path never surfaces these: lookups fail open. The administrative
//! path returns them synchronously so callers can map them to client or
//! server errors, and the scheduler logs them per tick.

/// Errors raised by rule construction, the rule store and its storage backend.
#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    /// Bad input on the write path (unknown match mode, empty key, wrong body shape).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Get or delete addressed a key that is not in the live rule set.
    #[error("{key} not found in {resource}")]
    NotFound { key: String, resource: String },

    /// Stored payload could not be used as a rule set.
    #[error("Malformed rule data: {0}")]
    MalformedData(String),

    /// Persistence backend failed to read or write.
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored view could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RedirectError {
    /// HTTP-style status code for the administrative surface.
    pub fn status_code(&self) -> u16 {
        match self {
            RedirectError::InvalidArgument(_) => 400,
            RedirectError::NotFound { .. } => 404,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RedirectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RedirectError::InvalidArgument("x".into()).status_code(), 400);
        let not_found = RedirectError::NotFound {
            key: "chair".into(),
            resource: "/schema/analysis/redirect".into(),
        };
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(
            not_found.to_string(),
            "chair not found in /schema/analysis/redirect"
        );
        assert_eq!(RedirectError::MalformedData("x".into()).status_code(), 500);
    }
}
