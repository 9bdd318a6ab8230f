//! Configuration for shelfrate.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of the resolved config)
//! 2. Environment variables (ABS_URL, API_TOKEN, LIBRARY_IDS, REFRESH_DAYS,
//!    BATCH_SIZE, SLEEP_TIMER, DRY_RUN, SHELFRATE_HOME)
//! 3. Config file (.shelfrate/config.yaml)
//! 4. Defaults (~/.shelfrate)
//!
//! Config file discovery:
//! - Searches current directory and parents for .shelfrate/config.yaml
//! - `paths.home` is relative to the .shelfrate/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::matching::MatchTuning;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".shelfrate";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub matching: Option<MatchTuning>,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
    #[serde(default)]
    pub regions: Option<Vec<RegionConfig>>,
    #[serde(default)]
    pub secondary: SecondaryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .shelfrate/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaConfig {
    /// Media server base URL
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub library_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    pub refresh_days: Option<i64>,
    pub batch_size: Option<usize>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecondaryConfig {
    pub base_url: Option<String>,
}

/// Pacing, retry and timeout limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Pause between items before jitter
    #[serde(default = "default_base_sleep")]
    pub base_sleep_secs: f64,

    /// Random extra pause between items, drawn from [min, max]
    #[serde(default = "default_jitter_min")]
    pub jitter_min_secs: f64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max_secs: f64,

    /// Extra pause after an item that needed a full-text search
    #[serde(default = "default_search_penalty")]
    pub search_penalty_secs: f64,

    /// Pause between the primary and secondary catalog
    #[serde(default = "default_source_gap")]
    pub source_gap_secs: f64,

    /// Pause after a soft block signal before retrying the item
    #[serde(default = "default_recovery_pause")]
    pub recovery_pause_secs: f64,

    /// Growth factor of the recovery pause per consecutive signal
    #[serde(default = "default_recovery_multiplier")]
    pub recovery_multiplier: f64,

    /// Incomplete passes before an item goes into cooldown
    #[serde(default = "default_max_fail_attempts")]
    pub max_fail_attempts: u32,

    /// Consecutive block signals that abort the run
    #[serde(default = "default_max_consecutive_blocks")]
    pub max_consecutive_blocks: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_sleep() -> f64 {
    6.0
}
fn default_jitter_min() -> f64 {
    1.0
}
fn default_jitter_max() -> f64 {
    3.0
}
fn default_search_penalty() -> f64 {
    10.0
}
fn default_source_gap() -> f64 {
    1.0
}
fn default_recovery_pause() -> f64 {
    60.0
}
fn default_recovery_multiplier() -> f64 {
    1.0
}
fn default_max_fail_attempts() -> u32 {
    5
}
fn default_max_consecutive_blocks() -> u32 {
    3
}
fn default_request_timeout() -> u64 {
    20
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            base_sleep_secs: default_base_sleep(),
            jitter_min_secs: default_jitter_min(),
            jitter_max_secs: default_jitter_max(),
            search_penalty_secs: default_search_penalty(),
            source_gap_secs: default_source_gap(),
            recovery_pause_secs: default_recovery_pause(),
            recovery_multiplier: default_recovery_multiplier(),
            max_fail_attempts: default_max_fail_attempts(),
            max_consecutive_blocks: default_max_consecutive_blocks(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LimitsConfig {
    /// All pauses set to zero (tests, dry experiments)
    pub fn without_pauses() -> Self {
        Self {
            base_sleep_secs: 0.0,
            jitter_min_secs: 0.0,
            jitter_max_secs: 0.0,
            search_penalty_secs: 0.0,
            source_gap_secs: 0.0,
            recovery_pause_secs: 0.0,
            ..Self::default()
        }
    }
}

/// One regional storefront of the primary catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Short code, e.g. "us"
    pub code: String,

    /// Host name, e.g. "www.audible.com"
    pub host: String,

    pub accept_language: String,

    /// Value of the `audible_site_preference` cookie
    pub site_preference: String,

    /// `hreflang` of the alternate link pointing at this storefront
    pub hreflang: String,

    /// Item language values that make this the home storefront
    #[serde(default)]
    pub language_codes: Vec<String>,
}

impl RegionConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}", self.host)
    }

    pub fn serves_language(&self, language: &str) -> bool {
        let language = language.trim().to_lowercase();
        self.language_codes.iter().any(|code| *code == language)
    }
}

/// US and German storefronts
pub fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            code: "us".to_string(),
            host: "www.audible.com".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            site_preference: "us".to_string(),
            hreflang: "en-us".to_string(),
            language_codes: ["en", "eng", "english", "englisch"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
        RegionConfig {
            code: "de".to_string(),
            host: "www.audible.de".to_string(),
            accept_language: "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            site_preference: "de".to_string(),
            hreflang: "de-de".to_string(),
            language_codes: ["de", "deu", "ger", "german", "deutsch"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
    ]
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (history, reports, logs)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub media_url: Option<String>,
    pub api_token: Option<String>,
    pub library_ids: Vec<String>,
    pub refresh_days: i64,
    pub batch_size: usize,
    pub dry_run: bool,
    pub matching: MatchTuning,
    pub limits: LimitsConfig,
    pub regions: Vec<RegionConfig>,
    pub secondary_base_url: String,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`, without file or environment input
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_file: None,
            media_url: None,
            api_token: None,
            library_ids: Vec::new(),
            refresh_days: 90,
            batch_size: 150,
            dry_run: false,
            matching: MatchTuning::default(),
            limits: LimitsConfig::default(),
            regions: default_regions(),
            secondary_base_url: "https://www.goodreads.com".to_string(),
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.home.join("rating_history.json")
    }

    pub fn failed_path(&self) -> PathBuf {
        self.home.join("failed_history.json")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.home.join("reports")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn summary_env_path(&self) -> PathBuf {
        self.home.join("last_run.env")
    }

    /// Media server URL and token, or an error naming what is missing
    pub fn media_credentials(&self) -> Result<(&str, &str)> {
        let url = self
            .media_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("Media server URL not configured (set ABS_URL or media.url)")?;
        let token = self
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("API token not configured (set API_TOKEN or media.token)")?;
        Ok((url, token))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_env<T>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
        _ => Ok(None),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Merge defaults, the config file and the environment
fn resolve_config(
    config_file: Option<(PathBuf, ConfigFile)>,
    env: &dyn Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let (config_path, file) = match config_file {
        Some((path, file)) => (Some(path), file),
        None => (None, ConfigFile::default()),
    };

    let home = if let Some(env_home) = env("SHELFRATE_HOME").filter(|h| !h.is_empty()) {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home_path)) = (&config_path, &file.paths.home) {
        let config_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    let mut resolved = ResolvedConfig::with_home(home);
    resolved.config_file = config_path;

    resolved.media_url = env("ABS_URL")
        .or(file.media.url)
        .map(|u| u.trim_end_matches('/').to_string());
    resolved.api_token = env("API_TOKEN").or(file.media.token);

    resolved.library_ids = match env("LIBRARY_IDS") {
        Some(ids) => ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        None => file.media.library_ids,
    };

    if let Some(days) = parse_env::<i64>(env, "REFRESH_DAYS")?.or(file.schedule.refresh_days) {
        resolved.refresh_days = days;
    }
    if let Some(size) = parse_env::<usize>(env, "BATCH_SIZE")?.or(file.schedule.batch_size) {
        resolved.batch_size = size;
    }
    resolved.dry_run = env("DRY_RUN")
        .map(|raw| parse_bool(&raw))
        .or(file.schedule.dry_run)
        .unwrap_or(false);

    if let Some(matching) = file.matching {
        resolved.matching = matching;
    }
    if let Some(limits) = file.limits {
        resolved.limits = limits;
    }
    if let Some(sleep) = parse_env::<f64>(env, "SLEEP_TIMER")? {
        resolved.limits.base_sleep_secs = sleep;
    }
    if let Some(regions) = file.regions.filter(|r| !r.is_empty()) {
        resolved.regions = regions;
    }
    if let Some(base_url) = file.secondary.base_url {
        resolved.secondary_base_url = base_url.trim_end_matches('/').to_string();
    }

    Ok(resolved)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    resolve_config(config_file, &|key| std::env::var(key).ok(), default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve_config(None, &env_from(&[]), PathBuf::from("/tmp/.shelfrate")).unwrap();

        assert_eq!(config.home, PathBuf::from("/tmp/.shelfrate"));
        assert_eq!(config.refresh_days, 90);
        assert_eq!(config.batch_size, 150);
        assert!(!config.dry_run);
        assert_eq!(config.limits.max_fail_attempts, 5);
        assert_eq!(config.limits.max_consecutive_blocks, 3);
        assert_eq!(config.regions.len(), 2);
        assert!(config.config_file.is_none());
        assert!(config.media_credentials().is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".shelfrate");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
media:
  url: http://abs.local:13378/
  token: secret
  library_ids: [lib-a, lib-b]
schedule:
  refresh_days: 30
matching:
  secondary_accept: 0.8
limits:
  base_sleep_secs: 2
  max_fail_attempts: 3
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));

        let config = resolve_config(
            Some((config_path, parsed)),
            &env_from(&[]),
            PathBuf::from("/unused"),
        )
        .unwrap();
        assert_eq!(config.home, config_dir.join("state"));
        assert_eq!(config.media_url.as_deref(), Some("http://abs.local:13378"));
        assert_eq!(config.library_ids, vec!["lib-a", "lib-b"]);
        assert_eq!(config.refresh_days, 30);
        assert_eq!(config.matching.secondary_accept, 0.8);
        assert_eq!(config.matching.primary_accept, 0.70);
        assert_eq!(config.limits.base_sleep_secs, 2.0);
        assert_eq!(config.limits.max_fail_attempts, 3);
        assert_eq!(config.limits.recovery_pause_secs, 60.0);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            media: MediaConfig {
                url: Some("http://from-file".to_string()),
                token: None,
                library_ids: vec!["file-lib".to_string()],
            },
            ..Default::default()
        };
        let env = env_from(&[
            ("ABS_URL", "http://from-env"),
            ("API_TOKEN", "tok"),
            ("LIBRARY_IDS", "a, b,,c"),
            ("BATCH_SIZE", "10"),
            ("SLEEP_TIMER", "0"),
            ("DRY_RUN", "True"),
            ("SHELFRATE_HOME", "/data/shelfrate"),
        ]);

        let config = resolve_config(
            Some((PathBuf::from("/x/.shelfrate/config.yaml"), file)),
            &env,
            PathBuf::from("/unused"),
        )
        .unwrap();
        assert_eq!(config.media_url.as_deref(), Some("http://from-env"));
        assert_eq!(config.library_ids, vec!["a", "b", "c"]);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.limits.base_sleep_secs, 0.0);
        assert!(config.dry_run);
        assert_eq!(config.home, PathBuf::from("/data/shelfrate"));
        assert_eq!(config.media_credentials().unwrap(), ("http://from-env", "tok"));
        assert_eq!(config.summary_env_path(), PathBuf::from("/data/shelfrate/last_run.env"));
    }

    #[test]
    fn test_invalid_env_number_is_an_error() {
        let err = resolve_config(None, &env_from(&[("REFRESH_DAYS", "soon")]), PathBuf::from("/h"))
            .unwrap_err();
        assert!(err.to_string().contains("REFRESH_DAYS"));
    }

    #[test]
    fn test_region_language_match() {
        let regions = default_regions();
        assert!(regions[1].serves_language(" Deutsch "));
        assert!(!regions[1].serves_language("english"));
        assert_eq!(regions[0].base_url(), "https://www.audible.com");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
