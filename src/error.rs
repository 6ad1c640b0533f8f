use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupingError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("vectors must have the same dimension, got {left} and {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    ThresholdOutOfRange(f64),
}

pub type GroupingResult<T> = std::result::Result<T, GroupingError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Grouping(#[from] GroupingError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("course not found with ID: {0}")]
    CourseNotFound(i64),

    #[error("question not found with ID: {0}")]
    QuestionNotFound(i64),

    #[error("{0}")]
    Validation(String),
}
