use thiserror::Error;

/// Errors surfaced by the reading session.
///
/// Only `UnsupportedFormat`, `ViewDetached` and `Io` ever leave `Session::open`.
/// `NotReady` and `ConcurrentOpenRejected` name the silent no-op branches so
/// they can be logged consistently.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("session is not ready")]
    NotReady,

    #[error("another open is already in flight")]
    ConcurrentOpenRejected,

    #[error("no rendering view attached")]
    ViewDetached,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, SessionError::UnsupportedFormat { .. })
    }
}

impl From<zip::result::ZipError> for SessionError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::unsupported(format!("archive: {err}"))
    }
}

impl From<roxmltree::Error> for SessionError {
    fn from(err: roxmltree::Error) -> Self {
        Self::unsupported(format!("xml: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
