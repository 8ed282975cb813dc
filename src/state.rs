use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{EngineError, EngineResult};
use crate::result::ResultValue;

pub const DEFAULT_STATE_FILE: &str = ".pake-state";

/// A persisted record: the result recorded for a target at its last
/// successful build, plus the input signature that produced it (used to
/// decide whether a future run must rebuild). `input_sig` is unused
/// (empty) for fallback entries, which always re-hash rather than compare
/// a signature.
#[derive(Debug, Clone)]
pub(crate) struct StateEntry {
    pub result: ResultValue,
    pub input_sig: String,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    kind: String,
    value: JsonValue,
    input_sig: String,
}

impl From<&StateEntry> for WireEntry {
    fn from(entry: &StateEntry) -> Self {
        let (kind, value) = match &entry.result {
            ResultValue::FileDigest(d) => ("file", JsonValue::String(d.clone())),
            ResultValue::Json(v) => ("json", v.clone()),
            ResultValue::Absent => ("absent", JsonValue::Null),
        };
        WireEntry {
            kind: kind.to_string(),
            value,
            input_sig: entry.input_sig.clone(),
        }
    }
}

impl WireEntry {
    fn into_state_entry(self) -> Option<StateEntry> {
        let result = match self.kind.as_str() {
            "file" => ResultValue::FileDigest(self.value.as_str()?.to_string()),
            "json" => ResultValue::Json(self.value),
            "absent" => ResultValue::Absent,
            _ => return None,
        };
        Some(StateEntry {
            result,
            input_sig: self.input_sig,
        })
    }
}

/// Loads and saves the persistent target → last-recorded-result mapping.
///
/// Entries for targets not referenced during a run are preserved across
/// runs: `save` is always called with the union of the loaded map and
/// whatever this run updated, never with this run's subset alone.
pub(crate) struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        StateStore { path }
    }

    /// Returns the previously persisted mapping, or an empty map if the
    /// file is absent or corrupt. Corruption is logged, never fatal — the
    /// engine degrades to "rebuild everything" rather than refuse to run.
    pub fn load(&self) -> HashMap<String, StateEntry> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(_) => return HashMap::new(),
        };

        match serde_json::from_str::<HashMap<String, WireEntry>>(&text) {
            Ok(wire) => wire
                .into_iter()
                .filter_map(|(target, entry)| Some((target, entry.into_state_entry()?)))
                .collect(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state file is corrupt, starting from empty state");
                HashMap::new()
            }
        }
    }

    /// Writes the mapping atomically: serialize to a temp file in the same
    /// directory, then rename over the real path. A crash mid-write leaves
    /// the previous state file intact.
    pub fn save(&self, map: &HashMap<String, StateEntry>) -> EngineResult<()> {
        let wire: HashMap<&str, WireEntry> = map
            .iter()
            .map(|(target, entry)| (target.as_str(), WireEntry::from(entry)))
            .collect();
        let text = serde_json::to_string_pretty(&wire)
            .map_err(|e| EngineError::Config(format!("failed to serialize state: {e}")))?;

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, text).map_err(|e| io_err(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_err(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join(DEFAULT_STATE_FILE));

        let mut map = HashMap::new();
        map.insert(
            "./a.o".to_string(),
            StateEntry {
                result: ResultValue::FileDigest("abc123".to_string()),
                input_sig: "deadbeef".to_string(),
            },
        );
        map.insert(
            "all".to_string(),
            StateEntry {
                result: ResultValue::Json(serde_json::json!({"a": 1})),
                input_sig: "cafe".to_string(),
            },
        );
        store.save(&map).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["./a.o"].result, ResultValue::FileDigest("abc123".to_string()));
        assert_eq!(loaded["./a.o"].input_sig, "deadbeef");
        assert_eq!(loaded["all"].result, ResultValue::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn missing_state_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nonexistent"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_state_file_loads_empty_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_STATE_FILE);
        fs::write(&path, "{not json").unwrap();
        let store = StateStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn unrelated_entries_survive_a_partial_save() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join(DEFAULT_STATE_FILE));

        let mut first = HashMap::new();
        first.insert(
            "./unrelated".to_string(),
            StateEntry {
                result: ResultValue::FileDigest("111".to_string()),
                input_sig: String::new(),
            },
        );
        store.save(&first).unwrap();

        let mut loaded = store.load();
        loaded.insert(
            "./touched".to_string(),
            StateEntry {
                result: ResultValue::FileDigest("222".to_string()),
                input_sig: String::new(),
            },
        );
        store.save(&loaded).unwrap();

        let final_map = store.load();
        assert_eq!(final_map.len(), 2);
        assert!(final_map.contains_key("./unrelated"));
    }
}
