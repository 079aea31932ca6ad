use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaminaError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Dimension mismatch error: {0}")]
    DimensionMismatch(String),
    #[error("Degenerate geometry error: {0}")]
    DegenerateGeometry(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Post Processor error: {0}")]
    PostProcessor(String),
}

pub type Result<T> = std::result::Result<T, LaminaError>;
