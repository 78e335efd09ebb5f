use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ipnet::IpNet;

/// Raw CLI flags, mirroring the collector's flag table. Every field is
/// optional here; precedence is resolved in [`CollectorConfig::load`] as
/// env > CLI > default (there is no JSON config layer for the collector,
/// unlike the agent).
#[derive(Parser, Debug, Default)]
#[command(name = "metrics-collector", about = "Telemetry collector server")]
pub(crate) struct CliArgs {
    #[arg(short = 'a', long = "address")]
    address: Option<String>,
    #[arg(short = 'i', long = "store-interval")]
    store_interval: Option<String>,
    #[arg(short = 'f', long = "store-file")]
    store_file: Option<String>,
    #[arg(short = 'r', long = "restore")]
    restore: Option<String>,
    #[arg(short = 'k', long = "key")]
    key: Option<String>,
    #[arg(short = 'd', long = "database-dsn")]
    database_dsn: Option<String>,
    #[arg(short = 't', long = "trusted-subnet")]
    trusted_subnet: Option<String>,
    #[arg(long = "crypto-key")]
    crypto_key: Option<String>,
    #[arg(long = "grpc")]
    grpc: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectorConfig {
    pub(crate) bind: SocketAddr,
    pub(crate) store_interval: Duration,
    pub(crate) store_file: PathBuf,
    pub(crate) restore: bool,
    pub(crate) key: String,
    pub(crate) database_dsn: Option<String>,
    pub(crate) trusted_subnet: Option<IpNet>,
    pub(crate) crypto_key_dir: Option<PathBuf>,
    pub(crate) grpc: bool,
}

impl CollectorConfig {
    pub(crate) fn load(cli: &CliArgs) -> Result<Self> {
        let bind = resolve_socket_addr(
            "ADDRESS",
            cli.address.as_deref(),
            "127.0.0.1:8080",
        )?;
        let store_interval = resolve_duration(
            "STORE_INTERVAL",
            cli.store_interval.as_deref(),
            "300s",
        )?;
        let store_file = resolve_path(
            "STORE_FILE",
            cli.store_file.as_deref(),
            "/tmp/devops-metrics-db.json",
        )?;
        let restore = resolve_bool("RESTORE", cli.restore.as_deref(), true)?;
        let key = resolve_string("KEY", cli.key.as_deref(), "");
        let database_dsn = resolve_optional_string("DATABASE_DSN", cli.database_dsn.as_deref());
        let trusted_subnet = resolve_optional_ipnet(
            "TRUSTED_SUBNET",
            cli.trusted_subnet.as_deref(),
        )?;
        let crypto_key_dir =
            resolve_optional_path("CRYPTO_KEY", cli.crypto_key.as_deref())?;
        let grpc = resolve_bool(
            "GRPC",
            cli.grpc.map(|v| if v { "true" } else { "false" }).as_deref(),
            false,
        )?;

        Ok(Self {
            bind,
            store_interval,
            store_file,
            restore,
            key,
            database_dsn,
            trusted_subnet,
            crypto_key_dir,
            grpc,
        })
    }
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn pick<'a>(env_key: &str, cli_value: Option<&'a str>, default: &'a str) -> (String, String) {
    let resolved = env_override(env_key)
        .or_else(|| cli_value.map(str::to_string))
        .unwrap_or_else(|| default.to_string());
    (env_key.to_string(), resolved)
}

fn resolve_socket_addr(env_key: &str, cli_value: Option<&str>, default: &str) -> Result<SocketAddr> {
    let (key, raw) = pick(env_key, cli_value, default);
    raw.parse()
        .with_context(|| format!("{key} must be a valid socket address, got '{raw}'"))
}

fn resolve_duration(env_key: &str, cli_value: Option<&str>, default: &str) -> Result<Duration> {
    let (key, raw) = pick(env_key, cli_value, default);
    humantime::parse_duration(&raw)
        .with_context(|| format!("{key} must be a duration like '300s', got '{raw}'"))
}

fn resolve_path(env_key: &str, cli_value: Option<&str>, default: &str) -> Result<PathBuf> {
    let (key, raw) = pick(env_key, cli_value, default);
    if raw.is_empty() {
        anyhow::bail!("{key} must not be empty");
    }
    Ok(PathBuf::from(raw))
}

fn resolve_bool(env_key: &str, cli_value: Option<&str>, default: bool) -> Result<bool> {
    let default_str = if default { "true" } else { "false" };
    let (key, raw) = pick(env_key, cli_value, default_str);
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} must be a boolean, got '{raw}'"),
    }
}

fn resolve_string(env_key: &str, cli_value: Option<&str>, default: &str) -> String {
    let (_, raw) = pick(env_key, cli_value, default);
    raw
}

fn resolve_optional_string(env_key: &str, cli_value: Option<&str>) -> Option<String> {
    env_override(env_key).or_else(|| cli_value.map(str::to_string))
}

fn resolve_optional_path(env_key: &str, cli_value: Option<&str>) -> Result<Option<PathBuf>> {
    match resolve_optional_string(env_key, cli_value) {
        Some(raw) if !raw.is_empty() => Ok(Some(PathBuf::from(raw))),
        _ => Ok(None),
    }
}

fn resolve_optional_ipnet(env_key: &str, cli_value: Option<&str>) -> Result<Option<IpNet>> {
    match resolve_optional_string(env_key, cli_value) {
        Some(raw) if !raw.is_empty() => {
            let net = raw
                .parse()
                .with_context(|| format!("{env_key} must be a valid CIDR, got '{raw}'"))?;
            Ok(Some(net))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const CONFIG_KEYS: &[&str] = &[
        "ADDRESS",
        "STORE_INTERVAL",
        "STORE_FILE",
        "RESTORE",
        "KEY",
        "DATABASE_DSN",
        "TRUSTED_SUBNET",
        "CRYPTO_KEY",
        "GRPC",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|key| ((*key).to_string(), env::var(key).ok()))
                .collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                if let Some(value) = value {
                    env::set_var(key, value);
                } else {
                    env::remove_var(key);
                }
            }
        }
    }

    fn with_env<R>(pairs: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _lock = env_lock().lock().expect("env test mutex must be lockable");
        let _guard = EnvGuard::capture(CONFIG_KEYS);
        for key in CONFIG_KEYS {
            env::remove_var(key);
        }
        for (key, value) in pairs {
            env::set_var(key, value);
        }
        f()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = with_env(&[], || {
            CollectorConfig::load(&CliArgs::default()).expect("defaults must parse")
        });
        assert_eq!(config.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.store_interval, Duration::from_secs(300));
        assert_eq!(config.store_file, PathBuf::from("/tmp/devops-metrics-db.json"));
        assert!(config.restore);
        assert_eq!(config.key, "");
        assert!(config.database_dsn.is_none());
        assert!(config.trusted_subnet.is_none());
        assert!(!config.grpc);
    }

    #[test]
    fn cli_overrides_default() {
        let cli = CliArgs {
            address: Some("0.0.0.0:9000".to_string()),
            ..CliArgs::default()
        };
        let config = with_env(&[], || {
            CollectorConfig::load(&cli).expect("cli override must parse")
        });
        assert_eq!(config.bind, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn env_overrides_cli() {
        let cli = CliArgs {
            address: Some("0.0.0.0:9000".to_string()),
            ..CliArgs::default()
        };
        let config = with_env(&[("ADDRESS", "10.0.0.1:7070")], || {
            CollectorConfig::load(&cli).expect("env override must parse")
        });
        assert_eq!(config.bind, "10.0.0.1:7070".parse().unwrap());
    }

    #[test]
    fn rejects_invalid_trusted_subnet() {
        let error = with_env(&[("TRUSTED_SUBNET", "not-a-cidr")], || {
            CollectorConfig::load(&CliArgs::default()).expect_err("must fail")
        });
        assert!(error.to_string().contains("TRUSTED_SUBNET must be a valid CIDR"));
    }
}
