//! `HubConfig` (§0 ambient configuration, §11): the core's own configuration
//! surface, loaded independently of whatever configuration the HTTP-router
//! collaborator layers on top.
//!
//! Grounded in the daemon's original `config.rs`: same `serde`-derived
//! struct + `Default` impl + environment-aware `config_dir()` resolution
//! (`*_CONFIG_DIR` env override, a `#[cfg(test)]`/`*_ENV=test` branch using a
//! `CARGO_MANIFEST_DIR`-relative `tmp/` directory, else a platform config dir
//! via `dirs::config_dir()`), generalized from the daemon's server-URL/token
//! client config to the session hub's own `allowed_path_prefixes`/`jobs_dir`/
//! timing knobs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Env var that overrides the config directory outright.
const CONFIG_DIR_ENV: &str = "HUB_CONFIG_DIR";
/// Env var whose value `"test"` routes config/storage into the repo's
/// `tmp/` directory, mirroring the `#[cfg(test)]` branch for integration
/// tests that can't rely on compile-time `cfg(test)`.
const HUB_ENV: &str = "HUB_ENV";

/// Recognized configuration keys (§6 Configuration, §11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Absolute path prefixes a session's `work_dir` must fall under.
    /// Empty means "any" (development mode) — §4.C `PathPolicy`.
    pub allowed_path_prefixes: Vec<PathBuf>,
    /// Directory where session records live (§4.F `Registry`).
    pub jobs_dir: PathBuf,
    /// Upper bound on graceful shutdown (§5, §12).
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
    /// TTL for the analytics collaborator's cache — not used by the core
    /// itself, carried through only because it's a recognized key (§6).
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Fan-out liveness ping interval (§4.D).
    #[serde(with = "duration_secs")]
    pub ping_interval: Duration,
    /// Fan-out stale-subscriber timeout (§4.D).
    #[serde(with = "duration_secs")]
    pub stale_timeout: Duration,
    /// Per-session subscriber cap (§4.D `attach`).
    pub max_subscribers_per_session: usize,
    /// Scrollback depth for the Screen Model (§3, §4.A).
    pub scrollback_lines: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            allowed_path_prefixes: Vec::new(),
            jobs_dir: default_jobs_dir(),
            shutdown_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            stale_timeout: Duration::from_secs(5 * 60),
            max_subscribers_per_session: 10,
            scrollback_lines: 1000,
        }
    }
}

fn default_jobs_dir() -> PathBuf {
    HubConfig::config_dir().map(|d| d.join("jobs")).unwrap_or_else(|_| PathBuf::from("jobs"))
}

/// Durations serialize as whole seconds (§11: "plain integer seconds, not a
/// structured duration type"), matching how the rest of the pack encodes
/// duration-valued config.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

impl HubConfig {
    /// Config directory resolution order (§11):
    /// 1. `#[cfg(test)]` — a repository-relative `tmp/hub-test` directory.
    /// 2. `HUB_CONFIG_DIR` env var override.
    /// 3. `HUB_ENV=test` — same repository-relative `tmp/hub-test`.
    /// 4. Platform default via `dirs::config_dir()` joined with `hub`.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/hub-test")
            }
            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
                    PathBuf::from(dir)
                } else if std::env::var(HUB_ENV).as_deref() == Ok("test") {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/hub-test")
                } else {
                    dirs::config_dir().context("could not determine platform config directory")?.join("hub")
                }
            }
        };
        Ok(dir)
    }

    /// Load `<config_dir>/hub.json` if present, else defaults (§11).
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("hub.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Persist the current configuration to `<config_dir>/hub.json`.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("hub.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
