//! The resolved, validated `Config` value threaded through every
//! constructor in the workspace — no module-level mutable config state
//! (Design Notes: "global config singleton" -> explicit value).

use std::collections::HashMap;

use common::Secret;
use copima_credentials::OAuth2ProviderConfig;
use copima_sink::{Compression, NamingConvention};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub gitlab: GitlabConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub progress: ProgressConfig,
    pub resume: ResumeConfig,
    pub oauth2: Oauth2Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitlabConfig {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret<String>>,
    pub timeout: u64,
    pub max_concurrency: usize,
    pub rate_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub path: String,
    pub wal_mode: bool,
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub root_dir: String,
    pub file_naming: NamingConvention,
    pub pretty_print: bool,
    pub compression: Compression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: String,
    /// `"json"` or `"pretty"`, mapped directly onto
    /// `tracing_subscriber::fmt::layer().json()` vs `.pretty()`.
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub console: bool,
    pub colors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressConfig {
    pub enabled: bool,
    pub file: String,
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConfig {
    pub enabled: bool,
    pub state_file: String,
    pub auto_save_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oauth2Config {
    pub providers: HashMap<String, OAuth2ProviderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Oauth2ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oauth2ServerConfig {
    pub port: u16,
    pub callback_path: String,
    pub timeout: u64,
}

impl Default for Config {
    /// Built-in defaults — the bottom layer of the five-layer merge.
    fn default() -> Self {
        Config {
            gitlab: GitlabConfig {
                host: "https://gitlab.com".to_string(),
                access_token: None,
                refresh_token: None,
                timeout: 30,
                max_concurrency: 5,
                rate_limit: 600,
            },
            database: DatabaseConfig {
                path: "./copima.db".to_string(),
                wal_mode: true,
                timeout: 30,
            },
            output: OutputConfig {
                root_dir: "./output".to_string(),
                file_naming: NamingConvention::KebabCase,
                pretty_print: false,
                compression: Compression::None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
                file: None,
                console: true,
                colors: true,
            },
            progress: ProgressConfig {
                enabled: true,
                file: "./progress.json".to_string(),
                interval: 5,
            },
            resume: ResumeConfig {
                enabled: true,
                state_file: "./resume-state.json".to_string(),
                auto_save_interval: 30,
            },
            oauth2: Oauth2Config {
                providers: HashMap::new(),
                server: Some(Oauth2ServerConfig {
                    port: 3000,
                    callback_path: "/callback".to_string(),
                    timeout: 300,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_roundtrip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.gitlab.host, "https://gitlab.com");
        assert_eq!(parsed.output.file_naming, NamingConvention::KebabCase);
    }
}
