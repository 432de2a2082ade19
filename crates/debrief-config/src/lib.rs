use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub tasks: Tasks,
    pub form: Form,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

/// External task-creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tasks {
    pub create_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
    #[serde(default = "default_priority")]
    pub default_priority: String,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_close_delay_ms() -> u64 {
    500
}

fn default_priority() -> String {
    "medium".to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.tasks.create_url.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "tasks.create_url must not be empty".to_string(),
        ));
    }
    if cfg.tasks.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "tasks.timeout_ms must be >= 1".to_string(),
        ));
    }
    if !matches!(cfg.form.default_priority.as_str(), "low" | "medium" | "high") {
        return Err(ConfigError::UnsupportedConfig(format!(
            "form.default_priority={} is not supported; supported: low, medium, high",
            cfg.form.default_priority
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(contents: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("debrief-config-test-{nanos}.yaml"));
        std::fs::write(&path, contents).expect("write temp config");
        path.to_string_lossy().to_string()
    }

    fn base_yaml() -> String {
        r#"
server:
  listen_addr: "127.0.0.1:0"

tasks:
  create_url: "http://127.0.0.1:8000/actions/task"
  timeout_ms: 10000

form:
  close_delay_ms: 500
  default_priority: "medium"
"#
        .to_string()
    }

    #[test]
    fn accepts_well_formed_config() {
        let path = write_temp_config(&base_yaml());
        let cfg = load_and_validate(&path).expect("config should be accepted");
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:0");
        assert_eq!(cfg.tasks.create_url, "http://127.0.0.1:8000/actions/task");
        assert_eq!(cfg.form.default_priority, "medium");
    }

    #[test]
    fn rejects_empty_create_url() {
        let path = write_temp_config(&base_yaml().replace(
            "create_url: \"http://127.0.0.1:8000/actions/task\"",
            "create_url: \"\"",
        ));
        let err = load_and_validate(&path).expect_err("expected rejection");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn rejects_zero_timeout() {
        let path =
            write_temp_config(&base_yaml().replace("timeout_ms: 10000", "timeout_ms: 0"));
        let err = load_and_validate(&path).expect_err("expected rejection");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn rejects_unknown_default_priority() {
        let path = write_temp_config(
            &base_yaml().replace("default_priority: \"medium\"", "default_priority: \"urgent\""),
        );
        let err = load_and_validate(&path).expect_err("expected rejection");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }
}
