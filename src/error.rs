use thiserror::Error;

/// Markers the document-reading service emits for dropped TLS records and
/// interrupted reads. Only these are worth another attempt.
const TRANSIENT_MARKERS: [&str; 3] = ["BAD_RECORD_MAC", "ReadError", "connection reset"];

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Oracle request failed: {0}")]
    OracleFailed(String),

    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    #[error("Oracle call failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: usize, message: String },

    #[error("Document error: {0}")]
    DocumentError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ReconcileError {
    /// Whether the failure is a network hiccup that a retry may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Transport { transient, message } => {
                *transient || has_transient_marker(message)
            }
            #[cfg(feature = "gemini")]
            ReconcileError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || has_transient_marker(&e.to_string())
            }
            _ => false,
        }
    }
}

fn has_transient_marker(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let tls = ReconcileError::Transport {
            message: "SSLV3_ALERT_BAD_RECORD_MAC during read".to_string(),
            transient: false,
        };
        assert!(tls.is_transient());

        let flagged = ReconcileError::Transport {
            message: "socket closed".to_string(),
            transient: true,
        };
        assert!(flagged.is_transient());

        let permanent = ReconcileError::OracleFailed("400 invalid argument".to_string());
        assert!(!permanent.is_transient());

        let plain = ReconcileError::Transport {
            message: "certificate rejected".to_string(),
            transient: false,
        };
        assert!(!plain.is_transient());
    }
}
