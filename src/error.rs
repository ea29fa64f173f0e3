//! Unified error types for the router.
//!
//! [`RouterError`] covers everything that can go wrong outside the
//! classifier: configuration, connection setup, publishing, acknowledging
//! and teardown. [`ClassifyError`] is the classifier's own failure type,
//! and [`ValidationError`] is one entry of a destination list report.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub destination: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  destination {}: {}: {}",
            self.destination, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible
        let _ = write!(buf, "{e}");
    }
    buf
}

/// Which step of connection setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Network,
    Session,
    Subscribe,
}

impl std::fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Network => "network connect",
            Self::Session => "session handshake",
            Self::Subscribe => "subscribe",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("Destination file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Destination file parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Destination list validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported destination file format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },

    #[error("Connect to {target} failed at {stage}: {source}")]
    Connect {
        target: String,
        stage: ConnectStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Publish to {subject} failed: {source}")]
    Publish {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Acknowledge failed: {source}")]
    Ack {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Close {target} failed: {}", failures.join("; "))]
    Close {
        target: String,
        failures: Vec<String>,
    },

    #[error("Connection to {target} lost: {reason}")]
    ConnectionLost { target: String, reason: String },

    #[error("Dispatch loop stopped unexpectedly: {0}")]
    DispatchStopped(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Why a payload could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("payload is not a JSON object or array")]
    Shape,

    #[error("unmarshal payload: {0}")]
    Unmarshal(#[from] serde_json::Error),

    #[error("no string field '{field}' in payload")]
    NoKey { field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_render_one_per_line() {
        let err = RouterError::ConfigValidation {
            errors: vec![
                ValidationError {
                    destination: "A".into(),
                    field: "publish_subject".into(),
                    message: "cannot be empty".into(),
                    suggestion: None,
                },
                ValidationError {
                    destination: "dsts[1]".into(),
                    field: "separator_value".into(),
                    message: "cannot be empty".into(),
                    suggestion: Some("set the key this destination serves".into()),
                },
            ],
        };
        let rendered = err.to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("destination A: publish_subject: cannot be empty"));
        assert!(rendered.ends_with("(set the key this destination serves)"));
    }

    #[test]
    fn close_error_joins_failures() {
        let err = RouterError::Close {
            target: "source".into(),
            failures: vec!["unsubscribe: gone".into(), "flush: timed out".into()],
        };
        assert_eq!(
            err.to_string(),
            "Close source failed: unsubscribe: gone; flush: timed out"
        );
    }
}
