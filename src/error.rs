//! Error types for the control network and bundle results core.

use thiserror::Error;

/// Errors raised by the core.
///
/// Low-level failures are wrapped with [`CoreError::Context`] at component
/// boundaries so the user sees which operation failed.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or unrecognized persisted data.
    #[error("{message} in [{file}]")]
    Format { file: String, message: String },

    /// Persisted schema newer (or older) than anything this crate reads.
    #[error("The {kind} version [{version}] is not supported")]
    UnsupportedVersion { kind: &'static str, version: i64 },

    /// A precondition of the requested operation is not met.
    #[error("{0}")]
    InvalidState(String),

    /// The adjustment is under-determined for the active convergence criterion.
    #[error("Computed degrees of freedom [{0}] is invalid.")]
    InvalidDegreesOfFreedom(i64),

    /// Pvl text could not be parsed or a keyword could not be interpreted.
    #[error("{0}")]
    Pvl(String),

    /// XML text could not be parsed or written.
    #[error("XML error: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Wrap `self` with a human-readable description of the failed operation.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        CoreError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context layers.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<quick_xml::Error> for CoreError {
    fn from(e: quick_xml::Error) -> Self {
        CoreError::Xml(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Format {
            file: "columnar container".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        CoreError::Io(e.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Attach operation context to any `Result<T, CoreError>`.
pub trait ResultExt<T> {
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context_with<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.wrap(f()))
    }
}
