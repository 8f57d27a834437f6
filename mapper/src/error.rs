use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("{kind} {key:?} not found")]
    NotFound { kind: &'static str, key: String },
    #[error("could not parse import: {0}")]
    Parse(String),
}

impl MapperError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn site_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "site",
            key: id.to_string(),
        }
    }

    pub fn region_not_found(code: &str) -> Self {
        Self::NotFound {
            kind: "region",
            key: code.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to build GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("GPX writer produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
