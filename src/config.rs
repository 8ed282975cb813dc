use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::state::DEFAULT_STATE_FILE;

/// Engine-level configuration: where the root is and where the state file
/// lives. Loaded from an optional `pake.toml` at the root, the same
/// "embedded default, overridable by an external file" pattern this
/// codebase uses for its rule sets — the file's absence is not an error.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root: PathBuf,
    pub state_file: PathBuf,
}

impl EngineConfig {
    pub const FILE_NAME: &'static str = "pake.toml";

    pub fn default_at(root: &Path) -> Self {
        EngineConfig {
            root: root.to_path_buf(),
            state_file: root.join(DEFAULT_STATE_FILE),
        }
    }

    /// Loads configuration for an engine rooted at `root`. A missing
    /// `pake.toml` yields the default config. A malformed one is a
    /// configuration error reported up front, before any rule is
    /// registered — unlike state-file corruption, which is data (not
    /// intent) and is tolerated.
    pub fn load(root: &Path) -> EngineResult<EngineConfig> {
        let mut config = EngineConfig::default_at(root);

        let config_path = root.join(Self::FILE_NAME);
        if !config_path.exists() {
            return Ok(config);
        }

        let text = fs::read_to_string(&config_path)
            .map_err(|e| EngineError::Io { path: config_path.clone(), source: e })?;
        let raw: RawConfig = toml::from_str(&text)
            .map_err(|e| EngineError::Config(format!("{}: {}", config_path.display(), e)))?;

        if let Some(engine) = raw.engine {
            if let Some(root_override) = engine.root {
                config.root = root.join(root_override);
            }
            if let Some(state_file) = engine.state_file {
                config.state_file = config.root.join(state_file);
            }
        }

        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    engine: Option<RawEngineSection>,
}

#[derive(Debug, Deserialize)]
struct RawEngineSection {
    root: Option<String>,
    state_file: Option<String>,
}
