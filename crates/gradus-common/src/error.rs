use std::fmt;

use thiserror::Error;

use crate::phase::Phase;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a caller-supplied step action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// What is wrong with a malformed step declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    MissingApply,
    MissingRevert,
    BadlyOrdered,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::MissingApply => f.write_str("missing apply action"),
            Defect::MissingRevert => f.write_str("missing revert action"),
            Defect::BadlyOrdered => f.write_str("badly ordered"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid migration step {name}: {defect}")]
    Definition { name: String, defect: Defect },

    #[error("bad direction: step count must be non-zero")]
    InvalidDirection,

    #[error("recorded position {0} is not a declared step")]
    UnknownPosition(String),

    #[error("couldn't {phase} step {name}: {source}")]
    Step {
        name: String,
        phase: Phase,
        attempted: usize,
        #[source]
        source: ActionError,
    },

    #[error("couldn't record step {name}: {reason}")]
    Bookkeeping {
        name: String,
        attempted: usize,
        reason: String,
    },

    #[error("inconsistent steps: pass {pass} applied {ups} and reverted {downs}")]
    Inconsistent { pass: usize, ups: usize, downs: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Number of steps attempted before the call failed, including the
    /// failing one. Nothing attempted in a failed call is persisted.
    pub fn attempted(&self) -> usize {
        match self {
            Error::Step { attempted, .. } | Error::Bookkeeping { attempted, .. } => *attempted,
            _ => 0,
        }
    }

    /// The defect, if this is a step definition error.
    pub fn defect(&self) -> Option<Defect> {
        match self {
            Error::Definition { defect, .. } => Some(*defect),
            _ => None,
        }
    }
}
