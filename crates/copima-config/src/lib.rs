//! Config Resolver: merges five layers (defaults ≪ local file ≪ user file
//! ≪ environment ≪ CLI args) into a validated, immutable `Config`.
//!
//! No module-level mutable singleton — every constructor in the workspace
//! takes an explicit `Config` value (Design Notes: "replace global config
//! singleton with an explicit Config value").

pub mod error;
mod interpolate;
mod merge;
mod model;
mod resolver;
mod validate;

pub use error::{Error, Result, Severity, ValidationIssue};
pub use merge::deep_merge;
pub use model::{
    Config, DatabaseConfig, GitlabConfig, LoggingConfig, Oauth2Config, Oauth2ServerConfig,
    OutputConfig, ProgressConfig, ResumeConfig,
};
pub use resolver::{ConfigResolver, env_layer};
pub use validate::validate;
