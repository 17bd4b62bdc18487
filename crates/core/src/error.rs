use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinqaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open pdf {path:?}: {message}")]
    PdfOpen { path: PathBuf, message: String },
    #[error("page rendering not enabled")]
    RenderSupportDisabled,
    #[error("ocr support not enabled")]
    OcrSupportDisabled,
    #[error("table detection failed on page {page}: {message}")]
    TableDetection { page: usize, message: String },
    #[error("summarization failed: {0}")]
    Summarization(String),
    #[error("unknown ocr mode: {0}")]
    UnknownOcrMode(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FinqaError>;

impl From<anyhow::Error> for FinqaError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
