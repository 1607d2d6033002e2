use std::path::PathBuf;

use thiserror::Error;

/// デコード、エンコード失敗の原因として保持するエラー型。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ConvertError {
    pub fn decode(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn encode(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Encode {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
