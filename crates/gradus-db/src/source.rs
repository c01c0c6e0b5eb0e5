use std::collections::BTreeMap;
use std::path::Path;

use gradus_common::{Error, Result};
use tracing::{debug, info};

use crate::registry::Registry;
use crate::step::{SqlAction, Step};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

#[derive(Default)]
struct SqlPair {
    up: Option<String>,
    down: Option<String>,
}

/// Build a registry from `<name>.up.sql` / `<name>.down.sql` files.
///
/// Steps are ordered by name. A step with only one of the two files is
/// still registered so that validation reports the missing half.
pub fn load_dir(dir: &Path) -> Result<Registry> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(format!("failed to read steps dir {}: {e}", dir.display()))
    })?;

    let mut pairs: BTreeMap<String, SqlPair> = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };

        if let Some(name) = file_name.strip_suffix(UP_SUFFIX) {
            pairs.entry(name.to_string()).or_default().up = Some(std::fs::read_to_string(&path)?);
        } else if let Some(name) = file_name.strip_suffix(DOWN_SUFFIX) {
            pairs.entry(name.to_string()).or_default().down =
                Some(std::fs::read_to_string(&path)?);
        } else {
            debug!("ignoring {}", path.display());
        }
    }

    info!("loaded {} step(s) from {}", pairs.len(), dir.display());
    Ok(pairs
        .into_iter()
        .map(|(name, pair)| {
            let mut step = Step::new(name);
            if let Some(up) = pair.up {
                step = step.apply_action(SqlAction::new(up));
            }
            if let Some(down) = pair.down {
                step = step.revert_action(SqlAction::new(down));
            }
            step
        })
        .collect())
}
