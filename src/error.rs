use std::io;

/// All error types for tileset streaming.
#[derive(thiserror::Error, Debug)]
pub enum TilesError {
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("Protocol error for {url}: HTTP status {status}")]
    Protocol { url: String, status: u16 },
    #[error("Tileset document error: {0}")]
    Document(String),
    #[error("Content error: {0}")]
    Content(String),
    #[error("Contract violation: {0}")]
    Contract(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TilesError {
    /// Whether this error signals a caller bug rather than a runtime or IO failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, TilesError::Contract(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TilesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_strings() {
        let e = TilesError::Transport {
            url: "a.glb".into(),
            message: "connection reset".into(),
        };
        assert_eq!(e.to_string(), "Transport error for a.glb: connection reset");

        let e = TilesError::Protocol {
            url: "b.glb".into(),
            status: 404,
        };
        assert_eq!(e.to_string(), "Protocol error for b.glb: HTTP status 404");

        let e = TilesError::Document("root is not an object".into());
        assert_eq!(e.to_string(), "Tileset document error: root is not an object");

        let e = TilesError::Content("bad glb".into());
        assert_eq!(e.to_string(), "Content error: bad glb");

        let e = TilesError::Contract("children already created".into());
        assert_eq!(e.to_string(), "Contract violation: children already created");
    }

    #[test]
    fn contract_violations_are_distinct() {
        assert!(TilesError::Contract("x".into()).is_contract_violation());
        assert!(!TilesError::Document("x".into()).is_contract_violation());
        assert!(
            !TilesError::Protocol {
                url: String::new(),
                status: 500
            }
            .is_contract_violation()
        );
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let e: TilesError = io_err.into();
        assert!(matches!(e, TilesError::Io(_)));
        assert!(e.to_string().contains("file missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: TilesError = json_err.into();
        assert!(matches!(e, TilesError::Json(_)));
    }
}
