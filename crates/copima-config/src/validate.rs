//! Validation rules producing `{field, severity, message}` per spec §4.7.
//! Every issue is collected before returning — `ConfigResolver::resolve`
//! raises `Error::Invalid` carrying the whole list, not just the first.

use crate::error::{Severity, ValidationIssue};
use crate::model::Config;

pub fn validate(config: &Config) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.gitlab.host.trim().is_empty() {
        issues.push(error("gitlab.host", "host must not be empty"));
    } else if !config.gitlab.host.starts_with("http://") && !config.gitlab.host.starts_with("https://") {
        issues.push(error("gitlab.host", "host must include a scheme (http:// or https://)"));
    }

    if config.gitlab.max_concurrency == 0 {
        issues.push(error("gitlab.maxConcurrency", "must be at least 1"));
    }

    if config.gitlab.rate_limit == 0 {
        issues.push(error("gitlab.rateLimit", "must be greater than 0 requests per minute"));
    }

    if config.gitlab.timeout == 0 {
        issues.push(warning("gitlab.timeout", "a zero timeout will fail every request immediately"));
    }

    if config.output.root_dir.trim().is_empty() {
        issues.push(error("output.rootDir", "root directory must not be empty"));
    }

    if config.database.path.trim().is_empty() {
        issues.push(error("database.path", "database path must not be empty"));
    }

    if config.resume.enabled && config.resume.state_file.trim().is_empty() {
        issues.push(error("resume.stateFile", "state file path required when resume is enabled"));
    }

    if config.resume.enabled && config.resume.auto_save_interval == 0 {
        issues.push(warning(
            "resume.autoSaveInterval",
            "a zero auto-save interval means the only checkpoint is at phase completion",
        ));
    }

    if config.progress.enabled && config.progress.file.trim().is_empty() {
        issues.push(error("progress.file", "progress file path required when progress is enabled"));
    }

    if config.gitlab.access_token.is_none() && config.oauth2.providers.is_empty() {
        issues.push(error(
            "gitlab.accessToken",
            "either a static access token or at least one oauth2 provider must be configured",
        ));
    }

    if let Some(server) = &config.oauth2.server
        && server.port == 0
    {
        issues.push(error("oauth2.server.port", "port must be nonzero"));
    }

    issues
}

fn error(field: &str, message: &str) -> ValidationIssue {
    ValidationIssue {
        field: field.to_string(),
        severity: Severity::Error,
        message: message.to_string(),
        code: "config-invalid",
    }
}

fn warning(field: &str, message: &str) -> ValidationIssue {
    ValidationIssue {
        field: field.to_string(),
        severity: Severity::Warning,
        message: message.to_string(),
        code: "config-invalid",
    }
}
