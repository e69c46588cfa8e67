use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::core::dispatch::DEFAULT_MAX_IN_FLIGHT;
use crate::core::hooks::DEFAULT_HOOKS_FILE;
use crate::core::state::DEFAULT_STATE_FILE;

pub const DEFAULT_DATABASE_FILE: &str = "processes.db";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub webhooks: PathBuf,
    pub state: PathBuf,
    pub poll_interval: Duration,
    pub webhook_timeout: Duration,
    pub dispatch_concurrency: usize,
    pub log_level: Level,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE_FILE),
            webhooks: PathBuf::from(DEFAULT_HOOKS_FILE),
            state: PathBuf::from(DEFAULT_STATE_FILE),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            dispatch_concurrency: DEFAULT_MAX_IN_FLIGHT,
            log_level: Level::INFO,
            log_file: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds settings from a variable lookup. Values that do not parse keep
    /// their default; each one produces a warning returned alongside.
    ///
    /// Warnings are handed back instead of logged because the subscriber is
    /// not installed until the log level is known.
    pub fn from_vars<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let mut warnings = Vec::new();

        if let Some(v) = non_empty(lookup("DOZER_DATABASE")) {
            settings.database = PathBuf::from(v);
        }
        if let Some(v) = non_empty(lookup("DOZER_WEBHOOKS")) {
            settings.webhooks = PathBuf::from(v);
        }
        if let Some(v) = non_empty(lookup("DOZER_STATE")) {
            settings.state = PathBuf::from(v);
        }

        if let Some(secs) = positive(
            "POLL_INTERVAL_SECONDS",
            lookup("POLL_INTERVAL_SECONDS"),
            &mut warnings,
        ) {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = positive(
            "WEBHOOK_TIMEOUT_SECONDS",
            lookup("WEBHOOK_TIMEOUT_SECONDS"),
            &mut warnings,
        ) {
            settings.webhook_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = positive(
            "DISPATCH_CONCURRENCY",
            lookup("DISPATCH_CONCURRENCY"),
            &mut warnings,
        ) {
            settings.dispatch_concurrency = n as usize;
        }

        if let Some(v) = non_empty(lookup("LOG_LEVEL")) {
            match Level::from_str(v.trim()) {
                Ok(level) => settings.log_level = level,
                Err(_) => warnings.push(format!(
                    "LOG_LEVEL '{}' is not a log level, using {}",
                    v, settings.log_level
                )),
            }
        }

        (settings, warnings)
    }

    /// Applies `--config`, `--state`, `--db`, `--interval` and `--log-file`
    /// on top of the environment. A flag missing its value is ignored.
    pub fn apply_flags(&mut self, args: &[String], start: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut i = start;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    if i + 1 < args.len() {
                        self.webhooks = PathBuf::from(&args[i + 1]);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "--state" => {
                    if i + 1 < args.len() {
                        self.state = PathBuf::from(&args[i + 1]);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "--db" => {
                    if i + 1 < args.len() {
                        self.database = PathBuf::from(&args[i + 1]);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "--interval" => {
                    if i + 1 < args.len() {
                        if let Some(secs) =
                            positive("--interval", Some(args[i + 1].clone()), &mut warnings)
                        {
                            self.poll_interval = Duration::from_secs(secs);
                        }
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "--log-file" => {
                    if i + 1 < args.len() {
                        self.log_file = Some(PathBuf::from(&args[i + 1]));
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        warnings
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive(name: &str, value: Option<String>, warnings: &mut Vec<String>) -> Option<u64> {
    let raw = non_empty(value)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warnings.push(format!(
                "{} '{}' is not a positive whole number, using the default",
                name, raw
            ));
            None
        }
    }
}
