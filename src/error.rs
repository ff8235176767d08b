use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BdfError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed header field '{field}': {value:?}")]
    MalformedHeaderField { field: &'static str, value: String },

    #[error("Header field '{field}' has {found} entries, expected {expected} (one per channel)")]
    ChannelCountMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Selection {expr} is out of range (valid: 1..={limit})")]
    SelectionOutOfRange { expr: String, limit: usize },

    #[error("Selection {expr} matched nothing")]
    SelectionEmpty { expr: String },

    #[error("Auxiliary status channel requested but not present")]
    MissingAuxiliaryChannel,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i64),

    #[error("Physical min equals physical max (channel {0})")]
    PhysicalMinEqualsMax(usize),

    #[error("Digital min equals digital max (channel {0})")]
    DigitalMinEqualsMax(usize),

    #[error("Data shape mismatch: {0}")]
    DataShapeMismatch(String),

    #[error("Invalid channel pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Failed to create worker pool: {0}")]
    ThreadPool(String),
}

impl BdfError {
    pub(crate) fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        BdfError::MalformedHeaderField {
            field,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BdfError>;
