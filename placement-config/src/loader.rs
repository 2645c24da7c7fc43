use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use placement_core::operator::OperatorConfig;
use serde_json::Value;
use tracing::debug;

/// Path to a TOML or JSON operator config file.
pub const CONFIG_PATH_ENV: &str = "PLACEMENT_OPERATOR_CONFIG_PATH";
/// Inline JSON operator config.
pub const CONFIG_JSON_ENV: &str = "PLACEMENT_OPERATOR_CONFIG_JSON";

/// Where the effective operator configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorConfigSource {
    EnvPath(PathBuf),
    EnvInline,
    Default,
}

/// Load operator configuration overrides using environment variables.
/// Evaluation order:
/// 1) `$PLACEMENT_OPERATOR_CONFIG_PATH` (TOML or JSON file),
/// 2) `$PLACEMENT_OPERATOR_CONFIG_JSON` (inline JSON),
/// 3) defaults if neither is set.
pub fn load_from_env() -> anyhow::Result<(OperatorConfig, OperatorConfigSource)> {
    load_from_lookup(|key| env::var(key).ok())
}

/// [`load_from_env`] with a caller-supplied variable lookup.
pub fn load_from_lookup<F>(lookup: F) -> anyhow::Result<(OperatorConfig, OperatorConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path_str) = lookup(CONFIG_PATH_ENV)
        && !path_str.trim().is_empty()
    {
        let path = PathBuf::from(path_str);
        let config = load_from_file(&path)?;
        debug!(path = %path.display(), "operator config loaded from env path");
        return Ok((config, OperatorConfigSource::EnvPath(path)));
    }

    if let Some(raw) = lookup(CONFIG_JSON_ENV)
        && !raw.trim().is_empty()
    {
        let config =
            parse_json(&raw).with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
        debug!("operator config loaded from inline environment json");
        return Ok((config, OperatorConfigSource::EnvInline));
    }

    Ok((OperatorConfig::default(), OperatorConfigSource::Default))
}

pub fn load_from_file(path: &Path) -> anyhow::Result<OperatorConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read operator config from {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents)
            .with_context(|| format!("invalid operator config {}", path.display())),
        Some("toml") | Some("tml") => {
            let value: Value = toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid operator config {}: {}", path.display(), err))?;
            materialize(value, &path.display().to_string())
        }
        _ => parse_from_str(&contents, &path.display().to_string()),
    }
}

/// Parses TOML, falling back to JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<OperatorConfig> {
    let value: Value = toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse operator config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })?;
    materialize(value, origin)
}

pub fn parse_json(raw: &str) -> anyhow::Result<OperatorConfig> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid operator config json: {err}"))?;
    materialize(value, "inline")
}

/// Expands human-readable durations, deserializes and validates.
fn materialize(value: Value, origin: &str) -> anyhow::Result<OperatorConfig> {
    let expanded = humantime_value::expand(value)
        .context("failed to normalize human-readable durations in operator config")?;
    let config: OperatorConfig = serde_json::from_value(expanded)
        .with_context(|| format!("invalid operator config in {origin}"))?;
    config
        .validate()
        .with_context(|| format!("operator config in {origin} failed validation"))?;
    Ok(config)
}

mod humantime_value {
    use std::time::Duration;

    use anyhow::Result;
    use serde_json::Value;

    /// Rewrites every string that parses as a duration (`"3s"`, `"10m"`)
    /// into the `{secs, nanos}` shape serde expects for `Duration`.
    pub fn expand(value: Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => match humantime::parse_duration(&s) {
                Ok(duration) => duration_to_value(duration),
                Err(_) => Value::String(s),
            },
            Value::Object(mut map) => {
                for (_, value) in map.iter_mut() {
                    *value = expand(value.take())?;
                }
                Value::Object(map)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(expand).collect::<Result<_>>()?)
            }
            other => other,
        })
    }

    fn duration_to_value(duration: Duration) -> Value {
        serde_json::json!({
            "secs": duration.as_secs(),
            "nanos": duration.subsec_nanos(),
        })
    }
}
