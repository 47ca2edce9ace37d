use crate::error::{ErrorKind, PdfEditError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Status record returned by every workspace operation.
/// Serializes as `{"status": ..., "message": ..., <detail fields>}`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport<T> {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(flatten)]
    pub details: Option<T>,
}

impl<T> OperationReport<T> {
    pub fn success(message: impl Into<String>, details: T) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            error_kind: None,
            details: Some(details),
        }
    }

    pub fn failure(error: &PdfEditError) -> Self {
        Self {
            status: Status::Error,
            message: error.to_string(),
            error_kind: Some(error.kind()),
            details: None,
        }
    }

    pub fn from_result(result: Result<(String, T)>) -> Self {
        match result {
            Ok((message, details)) => Self::success(message, details),
            Err(e) => {
                tracing::warn!(error = %e, "operation failed");
                Self::failure(&e)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Timing and size figures attached to document-producing operations
#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}
