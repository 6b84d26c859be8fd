#![forbid(unsafe_code)]

use crate::outcome::SourceLocation;
use hct_types::{CoverageLevel, TypeMatrixError};

/// Startup errors. Any of these aborts the run before a case executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate test case name {name:?}: registered at {first} and again at {second}")]
    DuplicateName {
        name: String,
        first: SourceLocation,
        second: SourceLocation,
    },
    #[error("type matrix: {0}")]
    TypeMatrix(#[from] TypeMatrixError),
    #[error("coverage level already fixed at {pinned:?}, cannot switch to {requested:?}")]
    CoverageLevelAlreadySet {
        pinned: CoverageLevel,
        requested: CoverageLevel,
    },
    #[error("{0}")]
    Profile(String),
}
