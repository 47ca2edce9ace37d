use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Reconstruction failed: {0}")]
    Reconstruction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse error classes exposed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Extraction,
    Reconstruction,
    Io,
}

impl PdfEditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfEditError::NotFound(_) => ErrorKind::NotFound,
            PdfEditError::Validation(_) => ErrorKind::Validation,
            PdfEditError::ParseError(_) | PdfEditError::Extraction(_) => ErrorKind::Extraction,
            PdfEditError::Reconstruction(_) => ErrorKind::Reconstruction,
            PdfEditError::Io(_)
            | PdfEditError::Decode(_)
            | PdfEditError::OperationError(_)
            | PdfEditError::SerializationError(_) => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for PdfEditError {
    fn from(err: serde_json::Error) -> Self {
        PdfEditError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfEditError>;
