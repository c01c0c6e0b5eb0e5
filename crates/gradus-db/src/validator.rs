use gradus_common::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::direction::Direction;
use crate::runner::Migrator;

const VALIDATION_PASSES: usize = 2;

/// Steps applied and reverted during one validation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassCount {
    pub ups: usize,
    pub downs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub passes: Vec<PassCount>,
}

impl Migrator {
    /// Walk every step up then down one at a time, twice, inside a
    /// transaction that is always rolled back.
    ///
    /// Each single-step call runs in its own savepoint, mirroring the
    /// per-call atomicity of [`Migrator::migrate`].
    pub fn validate_steps(&self, conn: &mut Connection) -> Result<ValidationReport> {
        let mut tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin validation: {e}")))?;
        let mut report = ValidationReport::default();

        for pass in 1..=VALIDATION_PASSES {
            info!("validation: pass {pass}");
            let mut counts = PassCount::default();

            for direction in [Direction::UP_ONE, Direction::DOWN_ONE] {
                loop {
                    debug!("validation: migrate {direction:?}");
                    let sp = tx
                        .savepoint()
                        .map_err(|e| Error::Database(format!("failed to open savepoint: {e}")))?;
                    let applied = self.migrate_in(&sp, direction)?;
                    sp.commit()
                        .map_err(|e| Error::Database(format!("failed to release savepoint: {e}")))?;

                    if applied == 0 {
                        break;
                    }
                    if direction.is_forward() {
                        counts.ups += applied;
                    } else {
                        counts.downs += applied;
                    }
                }
            }

            if counts.ups != counts.downs {
                return Err(Error::Inconsistent {
                    pass,
                    ups: counts.ups,
                    downs: counts.downs,
                });
            }
            report.passes.push(counts);
        }

        tx.rollback()
            .map_err(|e| Error::Database(format!("failed to discard validation: {e}")))?;
        Ok(report)
    }
}
