use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::ElementType;

/// Structured error types for the benchmark and the mask decoder.
///
/// The decoder only ever raises `UnsupportedRank`, `UnsupportedElementType` and
/// `InvalidTensor`. The remaining variants belong to the surrounding pipeline
/// (model loading, image I/O, configuration) and carry the context needed to
/// report which operation failed without parsing error strings.
#[derive(Error, Debug)]
pub enum ObjSpeedError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("unsupported tensor rank {rank} (expected 2, 3 or 4)")]
    UnsupportedRank { rank: usize },

    #[error("unsupported tensor element type {element_type:?}")]
    UnsupportedElementType { element_type: ElementType },

    #[error("invalid tensor: {reason}")]
    InvalidTensor { reason: String },
}

pub type Result<T> = std::result::Result<T, ObjSpeedError>;

impl ObjSpeedError {
    pub(crate) fn invalid_tensor(reason: impl Into<String>) -> Self {
        Self::InvalidTensor {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures raised while decoding a tensor into a mask.
    pub const fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedRank { .. }
                | Self::UnsupportedElementType { .. }
                | Self::InvalidTensor { .. }
        )
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build `ObjSpeedError::FileSystem`
/// directly; this is only the fallback.
impl From<std::io::Error> for ObjSpeedError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for ObjSpeedError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// ort failures without a more specific operation, such as output extraction.
impl From<ort::Error> for ObjSpeedError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort call".to_string(),
            source: Box::new(err),
        }
    }
}
