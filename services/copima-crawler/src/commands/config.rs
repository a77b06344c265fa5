//! `copima config show|set|unset|validate`
//!
//! `show`/`validate` run the same five-layer resolution the other
//! subcommands use; `set`/`unset` mutate only the local config file
//! (`./copima.toml`, the second-lowest layer) — they never touch the
//! environment or CLI-flag layers, which are supplied fresh on every
//! invocation and can't be "set" persistently.

use copima_config::{Config, ConfigResolver};
use serde_json::Value;

use crate::cli::ConfigCommand;
use crate::error::{Error, Result};

const LOCAL_CONFIG_PATH: &str = "./copima.toml";

pub async fn run(cmd: &ConfigCommand, resolver: &ConfigResolver, resolved: std::result::Result<Config, copima_config::Error>) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let config = resolved?;
            println!("{}", serde_json::to_string_pretty(&config).expect("Config always serializes"));
            Ok(())
        }
        ConfigCommand::Validate => match resolved {
            Ok(_) => {
                println!("configuration is valid");
                Ok(())
            }
            Err(copima_config::Error::Invalid { issues }) => {
                for issue in &issues {
                    println!("{:>7} {}: {}", format!("{:?}", issue.severity).to_lowercase(), issue.field, issue.message);
                }
                Err(Error::Config(copima_config::Error::Invalid { issues }))
            }
            Err(other) => Err(other.into()),
        },
        ConfigCommand::Set { key, value } => {
            let mut doc = read_local_toml().await?;
            set_dotted(&mut doc, key, parse_value(value));
            write_local_toml(&doc).await?;
            // Re-resolve so a malformed edit is caught immediately rather
            // than surfacing on the next unrelated command.
            let _ = resolver.resolve(Value::Object(Default::default()), Value::Object(Default::default()))?;
            println!("set {key} = {value}");
            Ok(())
        }
        ConfigCommand::Unset { key } => {
            let mut doc = read_local_toml().await?;
            unset_dotted(&mut doc, key);
            write_local_toml(&doc).await?;
            println!("unset {key}");
            Ok(())
        }
    }
}

async fn read_local_toml() -> Result<toml::Value> {
    match tokio::fs::read_to_string(LOCAL_CONFIG_PATH).await {
        Ok(contents) => toml::from_str(&contents).map_err(|e| Error::Other(anyhow::anyhow!("failed to parse {LOCAL_CONFIG_PATH}: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(toml::Value::Table(Default::default())),
        Err(e) => Err(Error::Other(anyhow::anyhow!("failed to read {LOCAL_CONFIG_PATH}: {e}"))),
    }
}

async fn write_local_toml(doc: &toml::Value) -> Result<()> {
    let text = toml::to_string_pretty(doc).map_err(|e| Error::Other(anyhow::anyhow!("failed to serialize {LOCAL_CONFIG_PATH}: {e}")))?;
    tokio::fs::write(LOCAL_CONFIG_PATH, text).await.map_err(|e| Error::Other(anyhow::anyhow!("failed to write {LOCAL_CONFIG_PATH}: {e}")))
}

fn set_dotted(doc: &mut toml::Value, key: &str, value: toml::Value) {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, init)) = segments.split_last() else { return };
    let mut cursor = doc.as_table_mut().expect("root is always a table");
    for segment in init {
        cursor = cursor.entry(segment.to_string()).or_insert_with(|| toml::Value::Table(Default::default())).as_table_mut().expect("config path collision: a scalar field was used as a section");
    }
    cursor.insert(last.to_string(), value);
}

fn unset_dotted(doc: &mut toml::Value, key: &str) {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, init)) = segments.split_last() else { return };
    let mut cursor = doc.as_table_mut().expect("root is always a table");
    for segment in init {
        let Some(next) = cursor.get_mut(*segment).and_then(|v| v.as_table_mut()) else {
            return;
        };
        cursor = next;
    }
    cursor.remove(*last);
}

fn parse_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return toml::Value::Integer(n);
    }
    if let Ok(n) = raw.parse::<f64>() {
        return toml::Value::Float(n);
    }
    toml::Value::String(raw.to_string())
}
