//! Configuration management for JobHunt.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. The pipeline only ever reads a resolved
//! snapshot of [`AppConfig`]; nothing in here is watched or reloaded.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "JOBHUNT_CONFIG";

/// Main application configuration.
///
/// This is loaded from `~/.config/jobhunt/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Location admission rules
    pub filters: FilterConfig,
    /// Title/keyword rules and penalties
    pub scoring: ScoringConfig,
    /// Mailbox feed settings
    pub email: EmailConfig,
    /// ATS sources and their company lists
    pub sources: SourcesConfig,
    /// Poll loop settings
    pub polling: PollingConfig,
    /// Per-host request budget shared by all connectors
    pub rate_limit: RateLimitConfig,
    /// Storage settings
    pub database: DatabaseConfig,
    /// Optional companies file, relative to the config file
    pub sources_file: Option<String>,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file, merging the companies file
    /// named by `sources_file` when present.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;

        if let Some(file) = config.sources_file.clone() {
            config.merge_companies_file(path, &file)?;
        }

        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `JOBHUNT_REMOTE_OK`: Override `filters.remote_ok` (true/false)
    /// - `JOBHUNT_EMAIL_ENABLED`: Override `email.enabled` (true/false)
    /// - `JOBHUNT_DATABASE_PATH`: Override `database.path`
    /// - `JOBHUNT_POLL_SECONDS`: Override `polling.interval_secs`
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the `JOBHUNT_*` environment overrides to this snapshot.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("JOBHUNT_REMOTE_OK") {
            if let Ok(remote_ok) = val.parse() {
                self.filters.remote_ok = remote_ok;
                tracing::debug!("Override filters.remote_ok from env: {}", remote_ok);
            }
        }

        if let Ok(val) = std::env::var("JOBHUNT_EMAIL_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.email.enabled = enabled;
                tracing::debug!("Override email.enabled from env: {}", enabled);
            }
        }

        if let Ok(val) = std::env::var("JOBHUNT_DATABASE_PATH") {
            if !val.trim().is_empty() {
                tracing::debug!("Override database.path from env: {}", val);
                self.database.path = Some(val);
            }
        }

        if let Ok(val) = std::env::var("JOBHUNT_POLL_SECONDS") {
            if let Ok(secs) = val.parse() {
                self.polling.interval_secs = secs;
                tracing::debug!("Override polling.interval_secs from env: {}", secs);
            }
        }
    }

    /// Replace company lists with the ones from a companies file.
    ///
    /// Only non-empty lists replace what the main file declared; a missing
    /// companies file leaves the config untouched.
    fn merge_companies_file(&mut self, config_path: &Path, file: &str) -> ConfigResult<()> {
        let mut companies_path = PathBuf::from(file);
        if companies_path.is_relative() {
            if let Some(dir) = config_path.parent() {
                companies_path = dir.join(companies_path);
            }
        }

        let Ok(contents) = fs::read_to_string(&companies_path) else {
            tracing::warn!(
                "Companies file {} not readable, keeping inline lists",
                companies_path.display()
            );
            return Ok(());
        };

        let parsed: CompaniesFile = toml::from_str(&contents)?;
        let theirs = parsed.sources;
        for (mine, theirs) in [
            (&mut self.sources.greenhouse, theirs.greenhouse),
            (&mut self.sources.lever, theirs.lever),
            (&mut self.sources.workday, theirs.workday),
            (&mut self.sources.smartrecruiters, theirs.smartrecruiters),
        ] {
            if !theirs.companies.is_empty() {
                mine.companies = theirs.companies;
            }
        }

        Ok(())
    }

    /// True when at least one source would produce leads.
    #[must_use]
    pub fn any_source_enabled(&self) -> bool {
        self.email.enabled
            || self.sources.greenhouse.enabled
            || self.sources.lever.enabled
            || self.sources.workday.enabled
            || self.sources.smartrecruiters.enabled
    }

    /// Resolve the database file path (explicit setting or data dir default).
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("jobhunt.db")),
        }
    }

    /// Get the path to the configuration file.
    ///
    /// Honors `JOBHUNT_CONFIG`, then XDG base directories:
    /// `~/.config/jobhunt/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let dirs = ProjectDirs::from("com", "jobhunt", "jobhunt").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/jobhunt`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "jobhunt", "jobhunt").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Location admission settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Admit leads that mention "remote"
    pub remote_ok: bool,
    /// If non-empty, a non-remote lead must match one of these terms
    pub locations_allow: Vec<String>,
    /// Any match rejects the lead outright
    pub locations_block: Vec<String>,
}

/// Scoring rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum score for a new job to be flagged for notification
    pub notify_min_score: i64,
    /// Rules matched against title and description
    pub title_rules: Vec<ScoreRule>,
    /// Additional keyword rules, same semantics as title rules
    pub keyword_rules: Vec<ScoreRule>,
    /// Weight adjustments that never produce tags
    pub penalties: Vec<PenaltyRule>,
}

/// A tagged scoring rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreRule {
    /// Tag recorded on matching jobs
    pub tag: String,
    /// Weight added once per matching rule
    pub weight: i64,
    /// Case-insensitive substrings, any of which triggers the rule
    pub any: Vec<String>,
}

/// A penalty rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyRule {
    /// Human-readable reason
    pub reason: String,
    /// Weight added once per matching penalty (usually negative)
    pub weight: i64,
    /// Case-insensitive substrings, any of which triggers the penalty
    pub any: Vec<String>,
}

/// Mailbox feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Whether the mailbox is polled
    pub enabled: bool,
    /// IMAP server host name
    pub imap_host: String,
    /// IMAP TLS port
    pub imap_port: u16,
    /// Login name
    pub username: String,
    /// Mailbox to select
    pub mailbox: String,
    /// Name of the environment variable holding the password
    pub password_env: String,
    /// If non-empty, only subjects containing one of these are parsed
    pub search_subject_any: Vec<String>,
    /// Upper bound on messages read per cycle
    pub max_messages: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            imap_host: String::new(),
            imap_port: 993,
            username: String::new(),
            mailbox: "INBOX".to_string(),
            password_env: "JOBHUNT_IMAP_PASSWORD".to_string(),
            search_subject_any: Vec::new(),
            max_messages: 30,
        }
    }
}

/// All ATS sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Greenhouse boards (slug = board token)
    pub greenhouse: SourceConfig,
    /// Lever postings API (slug = account name)
    pub lever: SourceConfig,
    /// Workday boards (slug = full board URL)
    pub workday: SourceConfig,
    /// SmartRecruiters postings API (slug = company identifier)
    pub smartrecruiters: SourceConfig,
}

/// One ATS source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether the source runs
    pub enabled: bool,
    /// Companies polled on this source
    pub companies: Vec<CompanyEntry>,
}

impl SourceConfig {
    /// Companies with a usable slug, names defaulted to the slug.
    #[must_use]
    pub fn active_companies(&self) -> Vec<CompanyEntry> {
        self.companies
            .iter()
            .filter_map(|c| {
                let slug = c.slug.trim();
                if slug.is_empty() {
                    return None;
                }
                let name = c.name.trim();
                Some(CompanyEntry {
                    slug: slug.to_string(),
                    name: if name.is_empty() { slug } else { name }.to_string(),
                })
            })
            .collect()
    }
}

/// A company on some ATS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyEntry {
    /// Source-specific identifier
    pub slug: String,
    /// Display name stored on leads
    pub name: String,
}

/// Poll loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between cycle starts
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Per-host token bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second per host
    pub requests_per_second: f64,
    /// Bucket size
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst: 2,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path; defaults to `<data dir>/jobhunt.db`
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompaniesFile {
    sources: SourcesConfig,
}
