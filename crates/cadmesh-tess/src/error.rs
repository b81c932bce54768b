//! 细分管线错误定义

use cadmesh_file::FileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TessError {
    #[error("Geometry consistency error: {0}")]
    GeometryConsistency(String),

    #[error("Cannot create shared memory segment {name}: {source}")]
    ResourceExhausted {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker failure: {0}")]
    WorkerFailure(String),

    #[error("Unknown pending handle: {0}")]
    UnknownHandle(String),

    #[error("Worker pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] FileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<cadmesh_core::shape::ShapeError> for TessError {
    fn from(e: cadmesh_core::shape::ShapeError) -> Self {
        TessError::GeometryConsistency(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TessError>;
