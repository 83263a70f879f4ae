use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Drafting is unavailable when unset.
    pub anthropic_api_key: Option<String>,
    pub ai_drafting_enabled: bool,
    /// Upper bound on one drafting call, including retries.
    pub drafting_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            ai_drafting_enabled: parse_bool(
                "AI_DRAFTING_ENABLED",
                &std::env::var("AI_DRAFTING_ENABLED").unwrap_or_else(|_| "true".to_string()),
            )?,
            drafting_timeout: Duration::from_secs(
                std::env::var("DRAFTING_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse::<u64>()
                    .context("DRAFTING_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Whether an export request may run the drafting pass at all.
    pub fn drafting_available(&self) -> bool {
        self.ai_drafting_enabled && self.anthropic_api_key.is_some()
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{key} must be a boolean, got '{other}'"),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for router tests; never touches the environment.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/proposals_test".to_string(),
            anthropic_api_key: None,
            ai_drafting_enabled: false,
            drafting_timeout: Duration::from_secs(5),
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}
