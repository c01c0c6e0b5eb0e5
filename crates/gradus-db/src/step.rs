use std::fmt;

use gradus_common::{ActionError, Phase};
use rusqlite::Connection;

pub type ActionResult = std::result::Result<(), ActionError>;

/// One direction of a migration step. Runs against the connection of the
/// atomic scope the runner opened, so everything it does is rolled back
/// together with the rest of the call on failure.
pub trait StepAction: Send + Sync {
    fn run(&self, conn: &Connection) -> ActionResult;
}

impl<F> StepAction for F
where
    F: Fn(&Connection) -> ActionResult + Send + Sync,
{
    fn run(&self, conn: &Connection) -> ActionResult {
        self(conn)
    }
}

/// A step action expressed as a batch of SQL statements.
#[derive(Debug, Clone)]
pub struct SqlAction {
    sql: String,
}

impl SqlAction {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl StepAction for SqlAction {
    fn run(&self, conn: &Connection) -> ActionResult {
        conn.execute_batch(&self.sql)?;
        Ok(())
    }
}

/// A named migration step carrying its apply/revert capability pair.
///
/// Either action may be absent at construction time; the registry reports
/// that as a definition error before anything touches the store.
pub struct Step {
    name: String,
    apply: Option<Box<dyn StepAction>>,
    revert: Option<Box<dyn StepAction>>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            apply: None,
            revert: None,
        }
    }

    /// Shorthand for a step whose both directions are SQL batches.
    pub fn sql(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self::new(name)
            .apply_action(SqlAction::new(up))
            .revert_action(SqlAction::new(down))
    }

    pub fn apply<F>(self, f: F) -> Self
    where
        F: Fn(&Connection) -> ActionResult + Send + Sync + 'static,
    {
        self.apply_action(f)
    }

    pub fn revert<F>(self, f: F) -> Self
    where
        F: Fn(&Connection) -> ActionResult + Send + Sync + 'static,
    {
        self.revert_action(f)
    }

    pub fn apply_action(mut self, action: impl StepAction + 'static) -> Self {
        self.apply = Some(Box::new(action));
        self
    }

    pub fn revert_action(mut self, action: impl StepAction + 'static) -> Self {
        self.revert = Some(Box::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self, phase: Phase) -> Option<&dyn StepAction> {
        match phase {
            Phase::Apply => self.apply.as_deref(),
            Phase::Revert => self.revert.as_deref(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("apply", &self.apply.is_some())
            .field("revert", &self.revert.is_some())
            .finish()
    }
}
