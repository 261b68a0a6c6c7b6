//! Grouping, weighted statistics and run orchestration.
//!
//! Respondents are grouped by domain and period, optionally split by one
//! category dimension, and each group's weighted income distribution is
//! described in nominal and real terms.

pub mod aggregate;
pub mod analyzer;
pub mod labor;
pub mod types;
