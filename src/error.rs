use thiserror::Error;

use crate::deflator::DeflatorError;
use crate::stats::StatsError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no usable sources: {rejected} rejected out of {supplied} supplied")]
    NoValidSources { supplied: usize, rejected: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("deflator error: {0}")]
    Deflator(#[from] DeflatorError),

    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
