use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use rotator_core::{
    processor::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVICE_URL},
    scratch::{get_default_output_dir, get_root_scratch_dir},
    workers::DEFAULT_MAX_MESSAGES,
};

#[derive(Parser, Debug)]
#[command(name = "rotator", version)]
#[command(
    about = "Listen for Cloud Storage notifications on a Pub/Sub subscription and rotate uploaded images"
)]
pub struct Cli {
    /// The ID of the project that owns the subscription
    pub project: String,

    /// The ID of the Pub/Sub subscription
    pub subscription: String,

    /// Rotation service endpoint, the angle is appended as a path segment (overrides ROTATOR_SERVICE_URL)
    #[arg(long)]
    pub service_url: Option<String>,

    /// Where rotated images go when the object has no `output-path` metadata (overrides ROTATOR_OUTPUT_DIR)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Root for temporary downloads (overrides ROTATOR_SCRATCH_DIR)
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Maximum messages pulled per batch (overrides ROTATOR_MAX_MESSAGES)
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Timeout for calls to the rotation service (overrides ROTATOR_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is unset (overrides ROTATOR_LOG_LEVEL)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines (or set ROTATOR_JSON_LOGS=true)
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project: String,
    pub subscription: String,
    pub service_url: String,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub max_messages: usize,
    pub request_timeout: Duration,
    pub log_level: String,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Cli::parse(), |key| env::var(key).ok())
    }

    /// Merge CLI arguments over environment values over defaults.
    pub fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_messages = match cli.max_messages {
            Some(value) => value,
            None => parse_env(&env, "ROTATOR_MAX_MESSAGES")?.unwrap_or(DEFAULT_MAX_MESSAGES),
        };
        anyhow::ensure!(max_messages > 0, "max messages must be > 0");

        let request_timeout = match cli.request_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => parse_env::<u64>(&env, "ROTATOR_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };

        let json_logs = cli.json_logs
            || parse_env::<bool>(&env, "ROTATOR_JSON_LOGS")?.unwrap_or(false);

        Ok(Self {
            project: cli.project,
            subscription: cli.subscription,
            service_url: cli
                .service_url
                .or_else(|| env("ROTATOR_SERVICE_URL"))
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string()),
            output_dir: cli
                .output_dir
                .or_else(|| env("ROTATOR_OUTPUT_DIR").map(PathBuf::from))
                .unwrap_or_else(get_default_output_dir),
            scratch_dir: cli
                .scratch_dir
                .or_else(|| env("ROTATOR_SCRATCH_DIR").map(PathBuf::from))
                .unwrap_or_else(get_root_scratch_dir),
            max_messages,
            request_timeout,
            log_level: cli
                .log_level
                .or_else(|| env("ROTATOR_LOG_LEVEL"))
                .unwrap_or_else(|| "info".to_string()),
            json_logs,
        })
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}
