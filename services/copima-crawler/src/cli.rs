//! Manual argument parsing for the `copima` binary.
//!
//! CLI parsing itself is out of scope for this crate's design (spec: "CLI
//! parsing ... touched only through their interfaces") — this module is
//! the thin glue that turns `std::env::args()` into the shapes the rest of
//! the workspace already understands (a `Config` CLI-layer `Value`, a list
//! of `Phase`s), not a general-purpose argument parser.

use copima_crawl::Phase;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct CommonFlags {
    pub host: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    pub output: Option<String>,
    pub database: Option<String>,
    pub resume: Option<bool>,
    pub verbose: bool,
}

impl CommonFlags {
    /// Materialize the flags as the CLI config layer (spec §4.7's fifth,
    /// highest-priority layer), in the same nested shape as the other
    /// layers `ConfigResolver` merges.
    pub fn as_config_layer(&self) -> Value {
        let mut gitlab = Map::new();
        if let Some(host) = &self.host {
            gitlab.insert("host".into(), Value::String(host.clone()));
        }
        if let Some(token) = &self.access_token {
            gitlab.insert("accessToken".into(), Value::String(token.clone()));
        }
        if let Some(token) = &self.refresh_token {
            gitlab.insert("refreshToken".into(), Value::String(token.clone()));
        }

        let mut root = Map::new();
        if !gitlab.is_empty() {
            root.insert("gitlab".into(), Value::Object(gitlab));
        }
        if let Some(output) = &self.output {
            let mut section = Map::new();
            section.insert("rootDir".into(), Value::String(output.clone()));
            root.insert("output".into(), Value::Object(section));
        }
        if let Some(database) = &self.database {
            let mut section = Map::new();
            section.insert("path".into(), Value::String(database.clone()));
            root.insert("database".into(), Value::Object(section));
        }
        if let Some(resume) = self.resume {
            let mut section = Map::new();
            section.insert("enabled".into(), Value::Bool(resume));
            root.insert("resume".into(), Value::Object(section));
        }
        Value::Object(root)
    }
}

#[derive(Debug, Clone)]
pub enum ConfigCommand {
    Show,
    Set { key: String, value: String },
    Unset { key: String },
    Validate,
}

#[derive(Debug, Clone)]
pub enum Command {
    Auth { provider: String },
    Crawl { phases: Vec<Phase> },
    Config(ConfigCommand),
    Test,
}

pub struct ParsedArgs {
    pub command: Command,
    pub flags: CommonFlags,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no command given (expected one of: auth, crawl, config, test)")]
    MissingCommand,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("unknown crawl phase {0:?} (expected one of: areas, users, resources, repository, all)")]
    UnknownPhase(String),
    #[error("{flag} requires a value")]
    MissingValue { flag: String },
    #[error("config set/unset requires a dotted key (and set requires a value)")]
    MalformedConfigArgs,
}

/// Parse `std::env::args()` (skipping argv[0]) into a command plus the
/// common flags shared by every subcommand.
pub fn parse(args: &[String]) -> Result<ParsedArgs, ParseError> {
    let mut iter = args.iter().peekable();
    let command_name = iter.next().cloned().ok_or(ParseError::MissingCommand)?;

    let mut flags = CommonFlags::default();
    let mut rest: Vec<String> = Vec::new();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--host" => flags.host = Some(take_value(&mut iter, "--host")?),
            "--access-token" => flags.access_token = Some(take_value(&mut iter, "--access-token")?),
            "--refresh-token" => flags.refresh_token = Some(take_value(&mut iter, "--refresh-token")?),
            "--account-id" => flags.account_id = Some(take_value(&mut iter, "--account-id")?),
            "--output" => flags.output = Some(take_value(&mut iter, "--output")?),
            "--database" => flags.database = Some(take_value(&mut iter, "--database")?),
            "--resume" => flags.resume = Some(true),
            "--no-resume" => flags.resume = Some(false),
            "--verbose" => flags.verbose = true,
            other => rest.push(other.to_string()),
        }
    }

    let command = match command_name.as_str() {
        "auth" => Command::Auth {
            provider: rest.first().cloned().unwrap_or_else(|| "gitlab".to_string()),
        },
        "crawl" => {
            let phases = if rest.is_empty() || rest[0] == "all" {
                Phase::ALL.to_vec()
            } else {
                let mut phases = Vec::with_capacity(rest.len());
                for name in &rest {
                    let stripped = name.strip_prefix("--steps=").unwrap_or(name);
                    for part in stripped.split(',') {
                        if part.is_empty() {
                            continue;
                        }
                        phases.push(Phase::parse(part).ok_or_else(|| ParseError::UnknownPhase(part.to_string()))?);
                    }
                }
                if phases.is_empty() { Phase::ALL.to_vec() } else { phases }
            };
            Command::Crawl { phases }
        }
        "config" => {
            let sub = rest.first().map(String::as_str).unwrap_or("show");
            let cmd = match sub {
                "show" => ConfigCommand::Show,
                "validate" => ConfigCommand::Validate,
                "set" => {
                    let key = rest.get(1).cloned().ok_or(ParseError::MalformedConfigArgs)?;
                    let value = rest.get(2).cloned().ok_or(ParseError::MalformedConfigArgs)?;
                    ConfigCommand::Set { key, value }
                }
                "unset" => {
                    let key = rest.get(1).cloned().ok_or(ParseError::MalformedConfigArgs)?;
                    ConfigCommand::Unset { key }
                }
                other => return Err(ParseError::UnknownCommand(format!("config {other}"))),
            };
            Command::Config(cmd)
        }
        "test" => Command::Test,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };

    Ok(ParsedArgs { command, flags })
}

fn take_value(iter: &mut std::iter::Peekable<std::slice::Iter<String>>, flag: &str) -> Result<String, ParseError> {
    iter.next().cloned().ok_or_else(|| ParseError::MissingValue { flag: flag.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn parses_crawl_all_by_default() {
        let parsed = parse(&args("crawl")).unwrap();
        assert!(matches!(parsed.command, Command::Crawl { phases } if phases == Phase::ALL.to_vec()));
    }

    #[test]
    fn parses_crawl_with_steps_filter() {
        let parsed = parse(&args("crawl --steps=areas,users")).unwrap();
        match parsed.command {
            Command::Crawl { phases } => assert_eq!(phases, vec![Phase::Areas, Phase::Users]),
            other => panic!("expected Crawl, got {other:?}"),
        }
    }

    #[test]
    fn parses_single_phase_subcommand() {
        let parsed = parse(&args("crawl resources")).unwrap();
        assert!(matches!(parsed.command, Command::Crawl { phases } if phases == vec![Phase::Resources]));
    }

    #[test]
    fn parses_common_flags_anywhere() {
        let parsed = parse(&args("crawl --host https://gitlab.example.com --account-id acct-1")).unwrap();
        assert_eq!(parsed.flags.host.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(parsed.flags.account_id.as_deref(), Some("acct-1"));
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(matches!(parse(&args("bogus")), Err(ParseError::UnknownCommand(_))));
    }

    #[test]
    fn rejects_unknown_phase() {
        assert!(matches!(parse(&args("crawl bogus")), Err(ParseError::UnknownPhase(_))));
    }

    #[test]
    fn parses_config_set() {
        let parsed = parse(&args("config set gitlab.host https://g.example.com")).unwrap();
        match parsed.command {
            Command::Config(ConfigCommand::Set { key, value }) => {
                assert_eq!(key, "gitlab.host");
                assert_eq!(value, "https://g.example.com");
            }
            other => panic!("expected Config(Set), got {other:?}"),
        }
    }

    #[test]
    fn flags_materialize_as_cli_layer() {
        let mut flags = CommonFlags::default();
        flags.host = Some("https://gitlab.test".into());
        let layer = flags.as_config_layer();
        assert_eq!(layer["gitlab"]["host"], Value::String("https://gitlab.test".into()));
    }
}
