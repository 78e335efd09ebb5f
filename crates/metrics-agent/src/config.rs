use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Raw CLI flags, mirroring the agent's flag table (§6). Every field is
/// optional here; precedence is resolved in [`AgentConfig::load`] as
/// env > CLI > JSON file > built-in default (§4.11).
#[derive(Parser, Debug, Default)]
#[command(name = "metrics-agent", about = "Telemetry reporting agent")]
pub(crate) struct CliArgs {
    #[arg(short = 'a', long = "address")]
    address: Option<String>,
    #[arg(short = 'p', long = "poll-interval")]
    poll_interval: Option<String>,
    #[arg(short = 'r', long = "report-interval")]
    report_interval: Option<String>,
    #[arg(short = 'k', long = "key")]
    key: Option<String>,
    #[arg(short = 'l', long = "rate-limit")]
    rate_limit: Option<String>,
    #[arg(long = "crypto-key")]
    crypto_key: Option<String>,
    #[arg(long = "grpc")]
    grpc: Option<bool>,
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

/// The JSON config file layer (§4.11). Field names match the CLI's long
/// flag names in lower-snake-case; durations are human-readable strings
/// (`"2s"`) parsed the same way as the CLI/env values.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    address: Option<String>,
    poll_interval: Option<String>,
    report_interval: Option<String>,
    key: Option<String>,
    rate_limit: Option<String>,
    crypto_key: Option<String>,
    grpc: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct AgentConfig {
    pub(crate) address: String,
    pub(crate) poll_interval: Duration,
    pub(crate) report_interval: Duration,
    pub(crate) key: String,
    pub(crate) rate_limit: usize,
    pub(crate) crypto_key_dir: Option<PathBuf>,
    pub(crate) grpc: bool,
}

impl AgentConfig {
    pub(crate) fn load(cli: &CliArgs) -> Result<Self> {
        let config_path = resolve_optional_string("CONFIG", cli.config.as_deref());
        let file = match &config_path {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };

        let address = resolve_string(
            "ADDRESS",
            cli.address.as_deref(),
            file.address.as_deref(),
            "127.0.0.1:8080",
        );
        let poll_interval = resolve_duration(
            "POLL_INTERVAL",
            cli.poll_interval.as_deref(),
            file.poll_interval.as_deref(),
            "2s",
        )?;
        let report_interval = resolve_duration(
            "REPORT_INTERVAL",
            cli.report_interval.as_deref(),
            file.report_interval.as_deref(),
            "10s",
        )?;
        let key = resolve_string("KEY", cli.key.as_deref(), file.key.as_deref(), "");
        let rate_limit = resolve_usize(
            "RATE_LIMIT",
            cli.rate_limit.as_deref(),
            file.rate_limit.as_deref(),
            10,
        )?;
        let crypto_key_dir = resolve_optional_path(
            "CRYPTO_KEY",
            cli.crypto_key.as_deref(),
            file.crypto_key.as_deref(),
        );
        let grpc = resolve_bool(
            "GRPC",
            cli.grpc.map(|v| if v { "true" } else { "false" }).as_deref(),
            file.grpc.map(|v| if v { "true" } else { "false" }),
            false,
        )?;

        if rate_limit == 0 {
            anyhow::bail!("RATE_LIMIT must be > 0");
        }

        Ok(Self {
            address,
            poll_interval,
            report_interval,
            key,
            rate_limit,
            crypto_key_dir,
            grpc,
        })
    }
}

fn load_file_config(path: &str) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read agent config file '{path}'"))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse agent config file '{path}'"))
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolves a value across the four layers, env-first: env > CLI > JSON
/// file > default.
fn pick<'a>(
    env_key: &str,
    cli_value: Option<&'a str>,
    file_value: Option<&'a str>,
    default: &'a str,
) -> (String, String) {
    let resolved = env_override(env_key)
        .or_else(|| cli_value.map(str::to_string))
        .or_else(|| file_value.map(str::to_string))
        .unwrap_or_else(|| default.to_string());
    (env_key.to_string(), resolved)
}

fn resolve_string(env_key: &str, cli_value: Option<&str>, file_value: Option<&str>, default: &str) -> String {
    let (_, raw) = pick(env_key, cli_value, file_value, default);
    raw
}

fn resolve_duration(
    env_key: &str,
    cli_value: Option<&str>,
    file_value: Option<&str>,
    default: &str,
) -> Result<Duration> {
    let (key, raw) = pick(env_key, cli_value, file_value, default);
    humantime::parse_duration(&raw)
        .with_context(|| format!("{key} must be a duration like '2s', got '{raw}'"))
}

fn resolve_usize(env_key: &str, cli_value: Option<&str>, file_value: Option<&str>, default: usize) -> Result<usize> {
    let default_str = default.to_string();
    let (key, raw) = pick(env_key, cli_value, file_value, &default_str);
    raw.parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))
}

fn resolve_bool(
    env_key: &str,
    cli_value: Option<&str>,
    file_value: Option<bool>,
    default: bool,
) -> Result<bool> {
    let file_str = file_value.map(|v| if v { "true" } else { "false" }.to_string());
    let default_str = if default { "true" } else { "false" };
    let (key, raw) = pick(env_key, cli_value, file_str.as_deref(), default_str);
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} must be a boolean, got '{raw}'"),
    }
}

fn resolve_optional_string(env_key: &str, cli_value: Option<&str>) -> Option<String> {
    env_override(env_key).or_else(|| cli_value.map(str::to_string))
}

fn resolve_optional_path(
    env_key: &str,
    cli_value: Option<&str>,
    file_value: Option<&str>,
) -> Option<PathBuf> {
    let raw = env_override(env_key)
        .or_else(|| cli_value.map(str::to_string))
        .or_else(|| file_value.map(str::to_string));
    raw.filter(|v| !v.is_empty()).map(PathBuf::from)
}
