use std::fmt;

use serde::{Deserialize, Serialize};

/// Which half of a step's capability pair is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Apply,
    Revert,
}

impl Phase {
    /// The verb used in log lines: "upgrade" for apply, "downgrade" for revert.
    pub fn verb(self) -> &'static str {
        match self {
            Phase::Apply => "upgrade",
            Phase::Revert => "downgrade",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Apply => f.write_str("apply"),
            Phase::Revert => f.write_str("revert"),
        }
    }
}
