use std::collections::HashSet;
use std::path::PathBuf;

use url::Url;

use crate::error::GitmirError;

/// Recognized `GITMIR_*` environment variables. `Config::from_env` rejects
/// any `GITMIR_*` variable not in this list, per the non-reflective config
/// loading this system requires (unknown keys are a startup error, not a
/// silent no-op).
const RECOGNIZED_KEYS: &[&str] = &[
    "GITMIR_UPSTREAM_BASE",
    "GITMIR_UPSTREAM_TOKEN",
    "GITMIR_DOWNSTREAM_URL",
    "GITMIR_DOWNSTREAM_TOKEN",
    "GITMIR_DOWNSTREAM_USER",
    "GITMIR_DEFAULT_SYNC_INTERVAL_SECONDS",
    "GITMIR_SYNC_TIMEOUT_SECONDS",
    "GITMIR_MAX_CONCURRENT_SYNCS",
    "GITMIR_RETRY_MAX",
    "GITMIR_LOCAL_CLONE_ROOT",
    "GITMIR_STORE_DSN",
    "GITMIR_LOG_LEVEL",
    "GITMIR_LOG_FILE",
    "GITMIR_TIMEZONE",
];

/// Validated, explicit configuration record. Every field here corresponds to
/// one recognized environment variable; there is no reflective/dynamic
/// config object anywhere in this system.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional upstream API root (informational; upstream URLs are taken
    /// per-mirror, this is only used where a mirror needs to resolve a
    /// relative upstream reference).
    pub upstream_base: Option<Url>,
    /// Token for private upstream clones, if any.
    pub upstream_token: Option<String>,

    /// Gitea base URL, e.g. `https://git.example.com`.
    pub downstream_url: Url,
    /// API token for the Gitea service account.
    pub downstream_token: String,
    /// Gitea username the token authenticates as (used for user-namespace
    /// pushes when a Mirror has no `downstream_owner`).
    pub downstream_user: String,

    pub default_sync_interval_seconds: u64,
    pub sync_timeout_seconds: u64,
    pub max_concurrent_syncs: usize,
    pub retry_max: u32,

    pub local_clone_root: PathBuf,
    pub store_dsn: String,

    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub timezone: String,
}

impl Config {
    /// Load configuration from the process environment, validating every
    /// recognized key and rejecting unrecognized `GITMIR_*` keys outright.
    pub fn from_env() -> Result<Self, GitmirError> {
        let recognized: HashSet<&str> = RECOGNIZED_KEYS.iter().copied().collect();
        for (key, _) in std::env::vars() {
            if key.starts_with("GITMIR_") && !recognized.contains(key.as_str()) {
                return Err(GitmirError::Config {
                    message: format!("unrecognized configuration key: {key}"),
                });
            }
        }

        let downstream_url = required_url("GITMIR_DOWNSTREAM_URL")?;
        let downstream_token = required("GITMIR_DOWNSTREAM_TOKEN")?;
        let downstream_user = required("GITMIR_DOWNSTREAM_USER")?;

        let upstream_base = optional("GITMIR_UPSTREAM_BASE")
            .map(|s| parse_url("GITMIR_UPSTREAM_BASE", &s))
            .transpose()?;
        let upstream_token = optional("GITMIR_UPSTREAM_TOKEN");

        let default_sync_interval_seconds =
            parse_or("GITMIR_DEFAULT_SYNC_INTERVAL_SECONDS", 3600)?;
        let sync_timeout_seconds = parse_or("GITMIR_SYNC_TIMEOUT_SECONDS", 900)?;
        let max_concurrent_syncs = parse_or("GITMIR_MAX_CONCURRENT_SYNCS", 3usize)?;
        let retry_max = parse_or("GITMIR_RETRY_MAX", 3u32)?;

        let local_clone_root = optional("GITMIR_LOCAL_CLONE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./gitmir-clones"));
        let store_dsn = optional("GITMIR_STORE_DSN")
            .unwrap_or_else(|| "gitmir.db".to_string());

        let log_level = optional("GITMIR_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_file = optional("GITMIR_LOG_FILE").map(PathBuf::from);
        let timezone = optional("GITMIR_TIMEZONE").unwrap_or_else(|| "UTC".to_string());

        if max_concurrent_syncs == 0 {
            return Err(GitmirError::Config {
                message: "GITMIR_MAX_CONCURRENT_SYNCS must be at least 1".into(),
            });
        }

        Ok(Self {
            upstream_base,
            upstream_token,
            downstream_url,
            downstream_token,
            downstream_user,
            default_sync_interval_seconds,
            sync_timeout_seconds,
            max_concurrent_syncs,
            retry_max,
            local_clone_root,
            store_dsn,
            log_level,
            log_file,
            timezone,
        })
    }

    /// The interval a given mirror should be synced at, honoring its
    /// per-mirror override if set.
    pub fn effective_interval(&self, mirror_override: Option<u64>) -> u64 {
        mirror_override.unwrap_or(self.default_sync_interval_seconds)
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn required(key: &str) -> Result<String, GitmirError> {
    optional(key).ok_or_else(|| GitmirError::Config {
        message: format!("missing required configuration: {key}"),
    })
}

fn parse_url(key: &str, value: &str) -> Result<Url, GitmirError> {
    Url::parse(value).map_err(|e| GitmirError::Config {
        message: format!("invalid URL for {key}: {e}"),
    })
}

fn required_url(key: &str) -> Result<Url, GitmirError> {
    parse_url(key, &required(key)?)
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, GitmirError> {
    match optional(key) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| GitmirError::Config {
            message: format!("invalid value for {key}: {s}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in RECOGNIZED_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_missing_required_key_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GitmirError::Config { .. }));
    }

    #[test]
    fn test_unrecognized_key_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITMIR_DOWNSTREAM_URL", "https://git.example.com");
        std::env::set_var("GITMIR_DOWNSTREAM_TOKEN", "tok");
        std::env::set_var("GITMIR_DOWNSTREAM_USER", "svc");
        std::env::set_var("GITMIR_BOGUS_KEY", "x");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, GitmirError::Config { .. }));
        std::env::remove_var("GITMIR_BOGUS_KEY");
        clear_env();
    }

    #[test]
    fn test_defaults_applied() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITMIR_DOWNSTREAM_URL", "https://git.example.com");
        std::env::set_var("GITMIR_DOWNSTREAM_TOKEN", "tok");
        std::env::set_var("GITMIR_DOWNSTREAM_USER", "svc");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.default_sync_interval_seconds, 3600);
        assert_eq!(cfg.max_concurrent_syncs, 3);
        assert_eq!(cfg.retry_max, 3);
        assert_eq!(cfg.downstream_user, "svc");
        clear_env();
    }

    #[test]
    fn test_effective_interval_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GITMIR_DOWNSTREAM_URL", "https://git.example.com");
        std::env::set_var("GITMIR_DOWNSTREAM_TOKEN", "tok");
        std::env::set_var("GITMIR_DOWNSTREAM_USER", "svc");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.effective_interval(None), 3600);
        assert_eq!(cfg.effective_interval(Some(120)), 120);
        clear_env();
    }
}
