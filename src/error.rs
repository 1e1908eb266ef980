use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model deserialization error: {0}")]
    Deserialization(#[from] bincode::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid database: {0}")]
    Database(String),

    #[error("Unsupported database at {}: {reason}", path.display())]
    UnsupportedDatabase { path: PathBuf, reason: String },

    #[error("Unknown database convention '{0}'")]
    UnknownConvention(String),

    #[error("Landmark index {index} out of range for shape with {num_landmarks} landmarks")]
    InvalidIndex { index: usize, num_landmarks: usize },

    #[error("Degenerate reference distance between landmarks {a} and {b}")]
    DegenerateReference { a: usize, b: usize },

    #[error("Shape mismatch: expected {expected} landmarks, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Cannot evaluate an empty sample set")]
    EmptyDataset,

    #[error("All {failed} samples failed; no normalized error available")]
    NoSuccessfulSamples { failed: usize },

    #[error("Sample {index} failed: {source}")]
    SampleFailed {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
