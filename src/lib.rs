pub mod analyzers;
pub mod category;
pub mod config;
pub mod deflator;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod record;
pub mod stats;

pub use error::{PipelineError, Result};
