//! Configuration loading and persistence, generalized from the teacher's
//! `config/loader.rs` (`get_global_settings_path`, `load_config_from_file`/
//! `save_config_to_file`, `validate_config_path`) and `config/mod.rs`'s
//! `AppState` defaults-on-missing-field pattern.

use crate::error::ConfigError;
use crate::plan::{Bounds, ExecutionMode, TestPlan};
use crate::schedule::RampShape;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk representation of a `TestPlan`, loadable as JSON or TOML
/// (extension-dispatched, as the teacher's `validate_config_path` does).
/// Fields mirror `TestPlan` with `#[serde(default)]` so partial documents
/// fall back sensibly, matching `AppState`'s "every field optional with a
/// sane default" convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub name: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_start_concurrency")]
    pub start_concurrency: u32,
    #[serde(default)]
    pub ramp_duration_ms: u64,
    #[serde(default = "default_ramp_shape")]
    pub ramp_shape: RampShape,
    #[serde(default = "default_sustain_ms")]
    pub sustain_duration_ms: u64,
    #[serde(default)]
    pub warmup_duration_ms: u64,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

fn default_start_concurrency() -> u32 {
    1
}

fn default_ramp_shape() -> RampShape {
    RampShape::Linear
}

fn default_sustain_ms() -> u64 {
    60_000
}

fn default_ring_capacity() -> usize {
    8192
}

impl EngineSettings {
    pub fn into_plan(self) -> Result<TestPlan, ConfigError> {
        let plan = TestPlan {
            name: self.name,
            mode: self.mode,
            start_concurrency: self.start_concurrency,
            ramp_duration_ms: self.ramp_duration_ms,
            ramp_shape: self.ramp_shape,
            sustain_duration_ms: self.sustain_duration_ms,
            warmup_duration_ms: self.warmup_duration_ms,
            bounds: self.bounds,
            ring_capacity: self.ring_capacity,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_plan(plan: &TestPlan) -> Self {
        EngineSettings {
            name: plan.name.clone(),
            mode: plan.mode,
            start_concurrency: plan.start_concurrency,
            ramp_duration_ms: plan.ramp_duration_ms,
            ramp_shape: plan.ramp_shape,
            sustain_duration_ms: plan.sustain_duration_ms,
            warmup_duration_ms: plan.warmup_duration_ms,
            bounds: plan.bounds,
            ring_capacity: plan.ring_capacity,
        }
    }
}

/// The directory configuration files are read from/written to by default,
/// analogous to the teacher's `get_global_settings_path` (there scoped to a
/// single app-settings file; here scoped to a directory of named plans,
/// since a load generator runs many distinct plans, not one global config).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadforge")
}

pub fn ensure_config_dir_exists(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Extension-dispatched parse, matching `validate_config_path`'s check
/// that the file is one of the formats the loader understands.
fn parse_document(path: &Path, contents: &str) -> Result<EngineSettings, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(contents)
            .map_err(|e| ConfigError::InvalidDocument(e.to_string())),
        Some("toml") => {
            toml::from_str(contents).map_err(|e| ConfigError::InvalidDocument(e.to_string()))
        }
        other => Err(ConfigError::InvalidDocument(format!(
            "unsupported config extension: {:?}",
            other
        ))),
    }
}

fn serialize_document(path: &Path, settings: &EngineSettings) -> Result<String, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::to_string_pretty(settings)
            .map_err(|e| ConfigError::InvalidDocument(e.to_string())),
        Some("toml") => {
            toml::to_string_pretty(settings).map_err(|e| ConfigError::InvalidDocument(e.to_string()))
        }
        other => Err(ConfigError::InvalidDocument(format!(
            "unsupported config extension: {:?}",
            other
        ))),
    }
}

/// Load a `TestPlan` from a JSON or TOML file on disk.
pub fn load_plan_from_file(path: impl AsRef<Path>) -> Result<TestPlan, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    let settings = parse_document(path, &contents)?;
    settings.into_plan()
}

/// Persist a `TestPlan` to disk as JSON or TOML, dispatched by extension.
pub fn save_plan_to_file(plan: &TestPlan, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_config_dir_exists(parent)?;
        }
    }
    let settings = EngineSettings::from_plan(plan);
    let document = serialize_document(path, &settings)?;
    std::fs::write(path, document)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_plan() -> TestPlan {
        crate::plan::TestPlanBuilder::new("smoke", ExecutionMode::Concurrency { max_concurrency: 20 })
            .ramp(Duration::from_secs(5), RampShape::Linear)
            .sustain(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = sample_plan();

        save_plan_to_file(&plan, &path).unwrap();
        let loaded = load_plan_from_file(&path).unwrap();

        assert_eq!(loaded.name, plan.name);
        assert_eq!(loaded.ramp_duration_ms, plan.ramp_duration_ms);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        let plan = sample_plan();

        save_plan_to_file(&plan, &path).unwrap();
        let loaded = load_plan_from_file(&path).unwrap();

        assert_eq!(loaded.name, plan.name);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = load_plan_from_file("/nonexistent/path/plan.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "name: x").unwrap();
        let result = load_plan_from_file(&path);
        assert!(matches!(result, Err(ConfigError::InvalidDocument(_))));
    }

    #[test]
    fn partial_document_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"name": "minimal"}"#).unwrap();
        let loaded = load_plan_from_file(&path).unwrap();
        assert_eq!(loaded.sustain_duration_ms, 60_000);
    }
}
