use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gradus_common::{Defect, Error, Phase, Result};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::direction::Direction;
use crate::position::{PositionRecord, PositionStore};
use crate::registry::Registry;
use crate::step::Step;
use crate::window::select_window;

/// Applies and reverts the steps of a registry against a SQLite database,
/// recording progress in a [`PositionStore`].
#[derive(Debug)]
pub struct Migrator {
    registry: Registry,
    store: PositionStore,
}

/// One line of `status` output: a declared step, a recorded one, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub name: String,
    pub declared: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

impl Migrator {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            store: PositionStore::default(),
        }
    }

    pub fn with_store(mut self, store: PositionStore) -> Self {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Run one migration call in its own transaction. Returns the number of
    /// steps executed; on error the whole call is rolled back.
    pub fn migrate(&self, conn: &mut Connection, direction: Direction) -> Result<usize> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        // Dropping `tx` on an early return rolls everything back.
        let applied = self.migrate_in(&tx, direction)?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit migration: {e}")))?;
        if applied > 0 {
            info!("migrated {applied} step(s) {}", direction.phase().verb());
        }
        Ok(applied)
    }

    /// Run one migration call inside a scope the caller already opened
    /// (a transaction or savepoint). The caller commits or rolls back.
    pub fn migrate_in(&self, scope: &Connection, direction: Direction) -> Result<usize> {
        self.registry.validate()?;
        if direction.is_zero() {
            return Err(Error::InvalidDirection);
        }

        self.store.ensure_table(scope)?;
        let current = self.store.current(scope)?;

        if current.is_none() && !direction.is_forward() {
            debug!("nothing applied, nothing to revert");
            return Ok(0);
        }

        let window = select_window(self.registry.steps(), current.as_deref(), direction)?;
        self.execute(scope, &window, direction.phase())
    }

    fn execute(&self, scope: &Connection, window: &[&Step], phase: Phase) -> Result<usize> {
        let mut attempted = 0;

        for step in window {
            attempted += 1;
            let name = step.name();

            let mut record = self
                .store
                .find(scope, name)
                .map_err(|e| bookkeeping(name, attempted, e))?
                .unwrap_or_else(|| PositionRecord::new(name));

            let action = step.action(phase).ok_or_else(|| Error::Definition {
                name: name.to_string(),
                defect: match phase {
                    Phase::Apply => Defect::MissingApply,
                    Phase::Revert => Defect::MissingRevert,
                },
            })?;

            info!("applying {} step {name}", phase.verb());
            if let Err(source) = action.run(scope) {
                warn!("{} step {name} failed: {source}", phase.verb());
                return Err(Error::Step {
                    name: name.to_string(),
                    phase,
                    attempted,
                    source,
                });
            }

            record.applied_at = match phase {
                Phase::Apply => Some(Utc::now()),
                Phase::Revert => None,
            };
            self.store
                .upsert(scope, &record)
                .map_err(|e| bookkeeping(name, attempted, e))?;
        }

        Ok(attempted)
    }

    /// Name of the greatest applied step, without creating the position table.
    pub fn current_position(&self, conn: &Connection) -> Result<Option<String>> {
        if !self.store.table_exists(conn)? {
            return Ok(None);
        }
        self.store.current(conn)
    }

    /// Declared steps merged with recorded history, ordered by name.
    pub fn status(&self, conn: &Connection) -> Result<Vec<StepStatus>> {
        let mut merged: BTreeMap<String, StepStatus> = self
            .registry
            .names()
            .map(|name| {
                let status = StepStatus {
                    name: name.to_string(),
                    declared: true,
                    applied_at: None,
                };
                (name.to_string(), status)
            })
            .collect();

        if self.store.table_exists(conn)? {
            for record in self.store.history(conn)? {
                merged
                    .entry(record.name.clone())
                    .or_insert_with(|| StepStatus {
                        name: record.name.clone(),
                        declared: false,
                        applied_at: None,
                    })
                    .applied_at = record.applied_at;
            }
        }

        Ok(merged.into_values().collect())
    }
}

fn bookkeeping(name: &str, attempted: usize, err: Error) -> Error {
    Error::Bookkeeping {
        name: name.to_string(),
        attempted,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::direction::Span;

    fn noop(name: &str) -> Step {
        Step::new(name)
            .apply(|_conn: &Connection| Ok(()))
            .revert(|_conn: &Connection| Ok(()))
    }

    fn noop_migrator(names: &[&str]) -> Migrator {
        Migrator::new(names.iter().copied().map(noop).collect())
    }

    #[test]
    fn step_by_step_forward_then_backward() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = noop_migrator(&["000", "001", "002"]);

        let mut ups = 0;
        loop {
            let n = migrator.migrate(&mut conn, Direction::UP_ONE).unwrap();
            if n == 0 {
                break;
            }
            assert_eq!(n, 1);
            ups += n;
        }
        assert_eq!(ups, 3);
        assert_eq!(
            migrator.current_position(&conn).unwrap().as_deref(),
            Some("002")
        );

        let mut downs = 0;
        loop {
            let n = migrator.migrate(&mut conn, Direction::DOWN_ONE).unwrap();
            if n == 0 {
                break;
            }
            downs += n;
        }
        assert_eq!(downs, 3);
        assert!(migrator.current_position(&conn).unwrap().is_none());
    }

    #[test]
    fn full_cycle_reapplies_every_step() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = noop_migrator(&["000", "001", "002"]);

        assert_eq!(migrator.migrate(&mut conn, Direction::UP_ALL).unwrap(), 3);
        assert_eq!(migrator.migrate(&mut conn, Direction::UP_ALL).unwrap(), 0);
        assert_eq!(migrator.migrate(&mut conn, Direction::DOWN_ALL).unwrap(), 3);
        assert_eq!(migrator.migrate(&mut conn, Direction::DOWN_ALL).unwrap(), 0);
        assert_eq!(migrator.migrate(&mut conn, Direction::UP_ALL).unwrap(), 3);

        let history = migrator.store().history(&conn).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(PositionRecord::is_applied));
    }

    #[test]
    fn backward_from_initial_position_does_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        let reverted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reverted);
        let migrator = Migrator::new(Registry::new().with_step(
            Step::new("000")
                .apply(|_conn: &Connection| Ok(()))
                .revert(move |_conn: &Connection| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        ));

        assert_eq!(migrator.migrate(&mut conn, Direction::DOWN_ALL).unwrap(), 0);
        assert_eq!(reverted.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_direction_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = noop_migrator(&["000", "001"]);
        let err = migrator
            .migrate(&mut conn, Direction::Up(Span::Steps(0)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDirection));
        assert!(!migrator.store().table_exists(&conn).unwrap());
    }

    #[test]
    fn registry_is_validated_before_touching_the_store() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(Registry::new().with_step(noop("001")).with_step(noop("000")));

        let err = migrator.migrate(&mut conn, Direction::UP_ALL).unwrap_err();
        assert_eq!(err.to_string(), "invalid migration step 000: badly ordered");
        assert!(!migrator.store().table_exists(&conn).unwrap());
    }

    #[test]
    fn missing_revert_fails_even_when_moving_forward() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(
            Registry::new().with_step(Step::new("000").apply(|_conn: &Connection| Ok(()))),
        );
        let err = migrator.migrate(&mut conn, Direction::UP_ALL).unwrap_err();
        assert_eq!(err.defect(), Some(Defect::MissingRevert));
    }

    #[test]
    fn failing_step_rolls_back_the_whole_window() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(
            Registry::new()
                .with_step(Step::sql("000", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;"))
                .with_step(Step::sql("001", "CREATE TABLE b (id INTEGER);", "DROP TABLE b;"))
                .with_step(
                    Step::new("002")
                        .apply(|_conn: &Connection| Err("this is a bad step".into()))
                        .revert(|_conn: &Connection| Ok(())),
                ),
        );

        let err = migrator.migrate(&mut conn, Direction::UP_ALL).unwrap_err();
        assert_eq!(err.attempted(), 3);
        assert!(matches!(
            err,
            Error::Step { ref name, phase: Phase::Apply, .. } if name == "002"
        ));

        assert!(migrator.current_position(&conn).unwrap().is_none());
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('a', 'b')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn extending_the_registry_applies_only_new_steps() {
        let mut conn = Connection::open_in_memory().unwrap();
        let first = noop_migrator(&["000"]);
        assert_eq!(first.migrate(&mut conn, Direction::UP_ALL).unwrap(), 1);

        let full = noop_migrator(&["000", "001", "002"]);
        assert_eq!(full.migrate(&mut conn, Direction::UP_ALL).unwrap(), 2);
        assert_eq!(full.migrate(&mut conn, Direction::UP_ALL).unwrap(), 0);
        assert_eq!(full.migrate(&mut conn, Direction::DOWN_ALL).unwrap(), 3);
    }

    #[test]
    fn undeclared_recorded_position_is_reported() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(
            noop_migrator(&["000", "001"])
                .migrate(&mut conn, Direction::UP_ALL)
                .unwrap(),
            2
        );

        let err = noop_migrator(&["000"])
            .migrate(&mut conn, Direction::DOWN_ONE)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPosition(ref n) if n == "001"));
    }

    #[test]
    fn wrecked_position_table_is_a_bookkeeping_failure() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE gradus_steps (name INTEGER, applied_at TEXT, bogus TEXT NOT NULL);",
        )
        .unwrap();

        let migrator = noop_migrator(&["000"]);
        let err = migrator.migrate(&mut conn, Direction::UP_ALL).unwrap_err();
        assert!(matches!(err, Error::Bookkeeping { ref name, attempted: 1, .. } if name == "000"));
    }

    #[test]
    fn status_merges_declared_and_recorded_steps() {
        let mut conn = Connection::open_in_memory().unwrap();
        noop_migrator(&["000", "001", "legacy"])
            .migrate(&mut conn, Direction::Up(Span::Steps(2)))
            .unwrap();
        noop_migrator(&["000", "001", "legacy"])
            .migrate(&mut conn, Direction::UP_ALL)
            .unwrap();

        let migrator = noop_migrator(&["000", "001", "002"]);
        let status = migrator.status(&conn).unwrap();
        let summary: Vec<_> = status
            .iter()
            .map(|s| (s.name.as_str(), s.declared, s.applied_at.is_some()))
            .collect();
        assert_eq!(
            summary,
            [
                ("000", true, true),
                ("001", true, true),
                ("002", true, false),
                ("legacy", false, true),
            ]
        );
    }

    #[test]
    fn status_without_position_table_lists_declared_steps() {
        let conn = Connection::open_in_memory().unwrap();
        let status = noop_migrator(&["000"]).status(&conn).unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].declared);
        assert!(status[0].applied_at.is_none());
        assert!(!PositionStore::default().table_exists(&conn).unwrap());
    }
}
