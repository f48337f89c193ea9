use std::path::{Path, PathBuf};

use datafusion::arrow::error::ArrowError;
use datafusion::parquet::errors::ParquetError;
use datagen_common::error::CommonError;
use thiserror::Error;

use crate::context::RunStage;

pub type DatagenResult<T> = Result<T, DatagenError>;

#[derive(Debug, Error)]
pub enum DatagenError {
    #[error("empty domain: {0}")]
    EmptyDomain(String),
    #[error("IO error at {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("another run is using the output root (lock file {} exists)", .0.display())]
    ConcurrentRunConflict(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("error in Arrow: {0}")]
    ArrowError(#[from] ArrowError),
    #[error("error in Parquet: {0}")]
    ParquetError(#[from] ParquetError),
    #[error("configuration error: {0}")]
    CommonError(#[from] CommonError),
    #[error("stage {stage} failed: {source}")]
    StageError {
        stage: RunStage,
        #[source]
        source: Box<DatagenError>,
    },
}

impl DatagenError {
    pub fn empty_domain(message: impl Into<String>) -> Self {
        DatagenError::EmptyDomain(message.into())
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DatagenError::IoError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DatagenError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DatagenError::InternalError(message.into())
    }

    /// Attaches the run stage that was being entered when the error occurred.
    pub fn in_stage(self, stage: RunStage) -> Self {
        match self {
            e @ DatagenError::StageError { .. } => e,
            e => DatagenError::StageError {
                stage,
                source: Box::new(e),
            },
        }
    }

    /// Returns the innermost error, skipping stage information.
    pub fn root_cause(&self) -> &DatagenError {
        match self {
            DatagenError::StageError { source, .. } => source.root_cause(),
            e => e,
        }
    }
}
