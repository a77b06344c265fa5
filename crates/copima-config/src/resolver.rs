//! Five-layer config resolution: defaults ≪ local file ≪ user file ≪
//! environment ≪ CLI args, later layers winning, merged deep on nested maps.
//!
//! File format is standardized on TOML (`copima.toml`), reusing the `toml`
//! dependency already pulled in for exactly this purpose.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::interpolate::interpolate;
use crate::merge::deep_merge;
use crate::model::Config;
use crate::validate::validate;

/// Resolves the five config layers into a validated `Config`.
pub struct ConfigResolver {
    local_path: PathBuf,
    user_path: PathBuf,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            local_path: PathBuf::from("./copima.toml"),
            user_path: default_user_config_path(),
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = path.into();
        self
    }

    pub fn with_user_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_path = path.into();
        self
    }

    /// Resolve and validate the effective configuration. `env` and `cli`
    /// are the fourth and fifth layers, already materialized as
    /// `serde_json::Value` objects by the caller (the binary parses
    /// `std::env::vars()`/CLI flags into these shapes; this crate owns only
    /// the merge/validate algorithm, not argument parsing).
    pub fn resolve(&self, env: Value, cli: Value) -> Result<Config> {
        let mut merged = serde_json::to_value(Config::default())
            .expect("Config::default always serializes");

        if let Some(local) = load_toml_layer(&self.local_path)? {
            debug!(path = %self.local_path.display(), "applying local config layer");
            deep_merge(&mut merged, local);
        }
        if let Some(user) = load_toml_layer(&self.user_path)? {
            debug!(path = %self.user_path.display(), "applying user config layer");
            deep_merge(&mut merged, user);
        }
        deep_merge(&mut merged, env);
        deep_merge(&mut merged, cli);

        let vars = interpolation_vars();
        interpolate(&mut merged, &vars);

        let config: Config = serde_json::from_value(merged).map_err(|e| Error::Parse {
            path: "<merged configuration>".into(),
            format: "json",
            message: e.to_string(),
        })?;

        let issues = validate(&config);
        if issues.iter().any(|i| i.severity == crate::error::Severity::Error) {
            return Err(Error::Invalid { issues });
        }
        for issue in &issues {
            warn!(field = issue.field, message = issue.message, "config validation warning");
        }

        Ok(config)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn default_user_config_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("copima").join("config.toml")
}

fn load_toml_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    let toml_value: toml::Value = toml::from_str(&contents).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        format: "toml",
        message: e.to_string(),
    })?;
    let json_value = serde_json::to_value(toml_value).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        format: "toml",
        message: e.to_string(),
    })?;
    Ok(Some(json_value))
}

/// Variables available for `${VAR}` interpolation: the process environment
/// plus the well-known `GITLAB_*` names, so `${GITLAB_HOST}` resolves the
/// same whether set directly or through `COPIMA_GITLAB_HOST`.
fn interpolation_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Build the environment layer (`COPIMA_<section>_<field>` plus the
/// well-known names) as a nested `Value`, per spec §6.
pub fn env_layer() -> Value {
    let mut root = serde_json::Map::new();

    let well_known: &[(&str, &[&str])] = &[
        ("GITLAB_HOST", &["gitlab", "host"]),
        ("GITLAB_ACCESS_TOKEN", &["gitlab", "accessToken"]),
        ("GITLAB_REFRESH_TOKEN", &["gitlab", "refreshToken"]),
        ("GITLAB_TIMEOUT", &["gitlab", "timeout"]),
        ("GITLAB_MAX_CONCURRENCY", &["gitlab", "maxConcurrency"]),
        ("GITLAB_RATE_LIMIT", &["gitlab", "rateLimit"]),
        ("DATABASE_PATH", &["database", "path"]),
        ("OUTPUT_ROOT_DIR", &["output", "rootDir"]),
        ("OUTPUT_FILE_NAMING", &["output", "fileNaming"]),
        ("LOG_LEVEL", &["logging", "level"]),
    ];

    for (var, path) in well_known {
        if let Ok(value) = std::env::var(var) {
            set_path(&mut root, path, parse_scalar(&value));
        }
    }

    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix("COPIMA_") else {
            continue;
        };
        let segments: Vec<String> = rest.split('_').map(|s| s.to_lowercase()).collect();
        if segments.len() < 2 {
            continue;
        }
        let path: Vec<&str> = segments.iter().map(|s| s.as_str()).collect();
        set_path(&mut root, &path, parse_scalar(&value));
    }

    Value::Object(root)
}

fn set_path(root: &mut serde_json::Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, init)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for segment in init {
        cursor = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()))
            .as_object_mut()
            .expect("environment layer path collision");
    }
    cursor.insert(last.to_string(), value);
}

/// Parse an environment string into the most specific JSON scalar it could
/// represent (bool, number, else string) so numeric/boolean config fields
/// deserialize correctly from an env override.
fn parse_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = raw.parse::<f64>()
        && let Some(num) = serde_json::Number::from_f64(n)
    {
        return Value::Number(num);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_alone_validate() {
        let resolver = ConfigResolver::new()
            .with_local_path("/nonexistent/copima.toml")
            .with_user_path("/nonexistent/user.toml");
        let config = resolver.resolve(json!({}), json!({})).unwrap();
        assert_eq!(config.gitlab.host, "https://gitlab.com");
    }

    #[test]
    fn cli_layer_wins_over_defaults() {
        let resolver = ConfigResolver::new()
            .with_local_path("/nonexistent/copima.toml")
            .with_user_path("/nonexistent/user.toml");
        let cli = json!({"gitlab": {"host": "https://gitlab.example.com"}});
        let config = resolver.resolve(json!({}), cli).unwrap();
        assert_eq!(config.gitlab.host, "https://gitlab.example.com");
    }

    #[test]
    fn env_layer_wins_over_local_file_but_not_cli() {
        let resolver = ConfigResolver::new()
            .with_local_path("/nonexistent/copima.toml")
            .with_user_path("/nonexistent/user.toml");
        let env = json!({"gitlab": {"host": "https://env.example.com"}});
        let cli = json!({"gitlab": {"host": "https://cli.example.com"}});
        let config = resolver.resolve(env, cli).unwrap();
        assert_eq!(config.gitlab.host, "https://cli.example.com");
    }

    #[test]
    fn local_toml_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copima.toml");
        std::fs::write(&path, "[gitlab]\nhost = \"https://file.example.com\"\n").unwrap();

        let resolver = ConfigResolver::new()
            .with_local_path(&path)
            .with_user_path("/nonexistent/user.toml");
        let config = resolver.resolve(json!({}), json!({})).unwrap();
        assert_eq!(config.gitlab.host, "https://file.example.com");
    }

    #[test]
    fn invalid_config_carries_every_issue() {
        let resolver = ConfigResolver::new()
            .with_local_path("/nonexistent/copima.toml")
            .with_user_path("/nonexistent/user.toml");
        let cli = json!({"gitlab": {"host": "", "maxConcurrency": 0, "rateLimit": 0}});
        let err = resolver.resolve(json!({}), cli).unwrap_err();
        match err {
            Error::Invalid { issues } => assert!(issues.len() >= 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn env_layer_parses_numeric_and_boolean_values() {
        assert_eq!(parse_scalar("30"), json!(30));
        assert_eq!(parse_scalar("true"), json!(true));
        assert_eq!(parse_scalar("gitlab.example.com"), json!("gitlab.example.com"));
    }
}
