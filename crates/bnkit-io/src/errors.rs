//! Error types for reading and writing network files.

use bnkit_core::BnError;
use thiserror::Error;

/// Errors raised while reading or writing a network file.
#[derive(Debug, Error)]
pub enum IoError {
    /// The document is not well-formed XML.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Well-formed XML that does not describe a network.
    #[error("parse error in <{element}>: {message}")]
    Parse { element: String, message: String },

    /// The described network is structurally invalid or has malformed CPTs.
    #[error(transparent)]
    Network(#[from] BnError),
}

impl IoError {
    pub(crate) fn parse(element: &str, message: impl Into<String>) -> Self {
        IoError::Parse {
            element: element.to_string(),
            message: message.into(),
        }
    }
}

pub type IoResult<T> = Result<T, IoError>;
