use std::path::{Path, PathBuf};

use gradus_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CANDIDATES: [&str; 3] = ["gradus.yml", "gradus.yaml", "gradus.toml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse a YAML or TOML config file, chosen by extension.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// First `gradus.{yml,yaml,toml}` found in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load `path` if given, else a discovered file in `dir`, else defaults.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<AppConfig> {
        match path.map(Path::to_path_buf).or_else(|| Self::discover(dir)) {
            Some(path) => Self::load(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(AppConfig::default())
            }
        }
    }
}
