//! Runner-wide state that is not part of the graph: load statistics, the
//! stream recorder and configuration values.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::constants::{INSTANCE_CONFIG_PATH, JACK_CONFIG_PATH, RUNNER_CONFIG_PATH};

/// A load statistic published under `/rnbo/jack/info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerInfoKey {
    /// DSP load, in percent.
    CpuLoad,
    /// Buffer under/overruns since the audio server started.
    XrunCount,
}

impl RunnerInfoKey {
    /// Parse an address segment.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "cpu_load" => Some(Self::CpuLoad),
            "xrun_count" => Some(Self::XrunCount),
            _ => None,
        }
    }
}

/// One load statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerInfoRecord {
    /// Which statistic.
    pub key: RunnerInfoKey,
    /// Human-readable label published with the leaf.
    pub description: String,
    /// Latest value.
    pub value: f64,
    /// Namespace path.
    pub path: String,
}

/// State of the runner's stream recorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StreamRecording {
    /// Recording.
    pub active: bool,
    /// Seconds captured by the current take.
    pub captured_seconds: f64,
}

/// Which configuration tree a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// `/rnbo/config`.
    Runner,
    /// `/rnbo/jack/config`.
    Jack,
    /// `/rnbo/inst/config`: defaults shared by every instance.
    Instances,
}

impl ConfigScope {
    /// Container path.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Runner => RUNNER_CONFIG_PATH,
            Self::Jack => JACK_CONFIG_PATH,
            Self::Instances => INSTANCE_CONFIG_PATH,
        }
    }
}

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEntry {
    /// Tree it lives in.
    pub scope: ConfigScope,
    /// Key relative to the scope's container.
    pub key: String,
    /// Namespace path.
    pub path: String,
    /// Current value, as loose JSON.
    pub value: Value,
    /// Allowed values, when the runner publishes a choice list.
    pub options: Vec<String>,
    /// Human-readable label.
    pub description: String,
}

/// Everything the runner reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunnerState {
    info: BTreeMap<RunnerInfoKey, RunnerInfoRecord>,
    /// Stream recorder.
    pub recording: StreamRecording,
    config: BTreeMap<ConfigScope, BTreeMap<String, ConfigEntry>>,
}

impl RunnerState {
    /// Statistic by key.
    #[must_use]
    pub fn info(&self, key: RunnerInfoKey) -> Option<&RunnerInfoRecord> {
        self.info.get(&key)
    }

    /// Insert or replace a statistic with its description.
    pub fn upsert_info(&mut self, record: RunnerInfoRecord) {
        self.info.insert(record.key, record);
    }

    /// Update a statistic's value, keeping its description.
    pub fn set_info_value(&mut self, key: RunnerInfoKey, path: &str, value: f64) {
        self.info
            .entry(key)
            .or_insert_with(|| RunnerInfoRecord {
                key,
                description: String::new(),
                value,
                path: path.to_string(),
            })
            .value = value;
    }

    /// Configuration value.
    #[must_use]
    pub fn config(&self, scope: ConfigScope, key: &str) -> Option<&ConfigEntry> {
        self.config.get(&scope)?.get(key)
    }

    /// Configuration values of one tree, ordered by key.
    pub fn config_entries(&self, scope: ConfigScope) -> impl Iterator<Item = &ConfigEntry> {
        self.config.get(&scope).into_iter().flat_map(BTreeMap::values)
    }

    /// Insert or replace a configuration value with its metadata.
    pub fn upsert_config(&mut self, entry: ConfigEntry) {
        self.config
            .entry(entry.scope)
            .or_default()
            .insert(entry.key.clone(), entry);
    }

    /// Update a configuration value, keeping its options and description.
    pub fn set_config_value(&mut self, scope: ConfigScope, key: &str, value: Value) {
        self.config
            .entry(scope)
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| ConfigEntry {
                scope,
                key: key.to_string(),
                path: format!("{}/{key}", scope.path()),
                value: Value::Null,
                options: Vec::new(),
                description: String::new(),
            })
            .value = value;
    }

    /// Drop every value of one tree.
    pub fn clear_config(&mut self, scope: ConfigScope) {
        self.config.remove(&scope);
    }

    /// Drop one configuration value.
    pub fn remove_config(&mut self, scope: ConfigScope, key: &str) -> bool {
        self.config
            .get_mut(&scope)
            .and_then(|entries| entries.remove(key))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_live_value_keeps_description() {
        let mut runner = RunnerState::default();
        runner.upsert_info(RunnerInfoRecord {
            key: RunnerInfoKey::CpuLoad,
            description: "DSP load".into(),
            value: 3.0,
            path: "/rnbo/jack/info/cpu_load".into(),
        });
        runner.set_info_value(RunnerInfoKey::CpuLoad, "/rnbo/jack/info/cpu_load", 41.5);

        let load = runner.info(RunnerInfoKey::CpuLoad).unwrap();
        assert_eq!(load.value, 41.5);
        assert_eq!(load.description, "DSP load");
    }

    #[test]
    fn test_config_scopes_are_separate() {
        let mut runner = RunnerState::default();
        runner.set_config_value(ConfigScope::Jack, "period_frames", json!(256));
        runner.set_config_value(ConfigScope::Runner, "period_frames", json!(128));

        assert_eq!(
            runner.config(ConfigScope::Jack, "period_frames").unwrap().path,
            "/rnbo/jack/config/period_frames"
        );
        runner.clear_config(ConfigScope::Runner);
        assert!(runner.config(ConfigScope::Runner, "period_frames").is_none());
        assert_eq!(runner.config_entries(ConfigScope::Jack).count(), 1);
    }

    #[test]
    fn test_serializes_as_json_object() {
        let mut runner = RunnerState::default();
        runner.set_info_value(RunnerInfoKey::XrunCount, "/rnbo/jack/info/xrun_count", 2.0);
        runner.set_config_value(ConfigScope::Instances, "auto_start_last", json!(true));

        let value = serde_json::to_value(&runner).unwrap();
        assert_eq!(value["info"]["xrun_count"]["value"], json!(2.0));
        assert_eq!(value["config"]["instances"]["auto_start_last"]["value"], json!(true));
    }
}
