//! Whitelisted filter programs over the in-memory SEO table.
//!
//! The model selects a program from a fixed grammar (predicate trees over
//! column/operator/literal plus projection, group-by-count, sort, limit and a
//! count aggregate). The interpreter binds nothing but the table: every column
//! reference is checked against the real schema before any row is touched.

pub mod eval;
pub mod program;

use thiserror::Error;

pub use eval::FilterOutput;
pub use program::{Aggregate, Comparison, FilterProgram, Operator, Predicate, SortSpec};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter program is not valid JSON for the filter grammar: {0}")]
    Malformed(String),
    #[error("unknown column `{column}`; available columns: {available}")]
    UnknownColumn { column: String, available: String },
    #[error("operator `{op}` on column `{column}` requires a `value`")]
    MissingValue { op: Operator, column: String },
    #[error("operator `{op}` on column `{column}`: {reason}")]
    InvalidValue { op: Operator, column: String, reason: String },
    #[error("conflicting filter program: {0}")]
    Conflict(String),
}
