//! Configuration management for beo-split using the prefer crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::split::{OcrMyPdf, PopplerLoader, SplitOptions, Splitter, DEFAULT_MARGIN_RATIO};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "beo-split.db";

/// Default storage bucket for processed archives.
pub const DEFAULT_STORAGE_BUCKET: &str = "beo-outputs";

/// Default lifetime of download links in days.
pub const DEFAULT_DOWNLOAD_URL_EXPIRY_DAYS: u64 = 30;

/// Default number of uploads allowed per client per hour.
pub const DEFAULT_RATE_LIMIT_PER_HOUR: u32 = 5;

/// Default OCR timeout in seconds.
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 300;

/// Splitting behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSettings {
    /// Header/footer band as a fraction of page height.
    pub margin_ratio: f64,
    /// Withhold per-identifier outputs when any page needs review.
    pub stop_on_problems: bool,
    /// Whether to try OCR when nothing resolves.
    pub ocr_enabled: bool,
    /// OCR command name or path.
    pub ocr_command: String,
    /// Upper bound on one OCR run.
    pub ocr_timeout_secs: u64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            margin_ratio: DEFAULT_MARGIN_RATIO,
            stop_on_problems: false,
            ocr_enabled: true,
            ocr_command: "ocrmypdf".to_string(),
            ocr_timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
        }
    }
}

/// Whether `ratio` leaves a body between the header and footer bands.
pub fn is_valid_margin_ratio(ratio: f64) -> bool {
    (0.0..0.5).contains(&ratio)
}

fn checked_margin_ratio(source: &str, ratio: f64) -> Option<f64> {
    if is_valid_margin_ratio(ratio) {
        Some(ratio)
    } else {
        tracing::warn!(
            "Ignoring margin ratio {} from {}: must be in [0, 0.5)",
            ratio,
            source
        );
        None
    }
}

impl SplitSettings {
    pub fn options(&self) -> SplitOptions {
        SplitOptions {
            margin_ratio: self.margin_ratio,
            stop_on_problems: self.stop_on_problems,
            ocr_enabled: self.ocr_enabled,
        }
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    /// Splitter backed by `pdftotext` and the configured OCR command.
    pub fn splitter(&self) -> Splitter {
        Splitter::new(Arc::new(PopplerLoader::new()), self.options()).with_ocr(Arc::new(
            OcrMyPdf::new(self.ocr_command.clone(), self.ocr_timeout()),
        ))
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database URL (overrides data_dir/DEFAULT_DATABASE_FILENAME if set).
    pub database_url: Option<String>,
    /// Bearer token required by the API. None disables auth.
    pub api_secret_key: Option<String>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Public base URL used for locally signed download links.
    pub public_base_url: String,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub storage_bucket_name: String,
    pub download_url_expiry_days: u64,
    pub postmark_api_key: Option<String>,
    pub postmark_from_email: Option<String>,
    /// Upload size limit. None means no limit.
    pub max_file_size_mb: Option<u64>,
    pub rate_limit_per_hour: u32,
    pub split: SplitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/.local/share/beo-split (or platform equivalent)
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beo-split");

        Self {
            data_dir,
            database_url: None,
            api_secret_key: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
            bind_address: "0.0.0.0:8000".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            supabase_url: None,
            supabase_service_key: None,
            storage_bucket_name: DEFAULT_STORAGE_BUCKET.to_string(),
            download_url_expiry_days: DEFAULT_DOWNLOAD_URL_EXPIRY_DAYS,
            postmark_api_key: None,
            postmark_from_email: None,
            max_file_size_mb: None,
            rate_limit_per_hour: DEFAULT_RATE_LIMIT_PER_HOUR,
            split: SplitSettings::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Full path to the default SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Directory holding uploaded files awaiting processing.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory used by local object storage.
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }

    /// Upload size limit in bytes.
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        self.max_file_size_mb.map(|mb| mb * 1024 * 1024)
    }

    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.download_url_expiry_days * 24 * 60 * 60)
    }

    /// Whether Supabase credentials are present.
    pub fn has_supabase(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_key.is_some()
    }

    /// Whether Postmark credentials are present.
    pub fn has_postmark(&self) -> bool {
        self.postmark_api_key.is_some() && self.postmark_from_email.is_some()
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [self.data_dir.clone(), self.uploads_dir(), self.storage_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("BEO_DATA_DIR") {
            self.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        if let Some(url) = get("DATABASE_URL") {
            tracing::debug!("Using DATABASE_URL from environment: {}", url);
            self.database_url = Some(url);
        }
        if let Some(key) = get("API_SECRET_KEY") {
            self.api_secret_key = Some(key);
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.cors_origins = parse_origins(&origins);
        }
        if let Some(bind) = get("BEO_BIND") {
            self.bind_address = bind;
        }
        if let Some(url) = get("BEO_PUBLIC_URL") {
            self.public_base_url = url;
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_KEY") {
            self.supabase_service_key = Some(key);
        }
        if let Some(bucket) = get("STORAGE_BUCKET_NAME") {
            self.storage_bucket_name = bucket;
        }
        if let Some(days) = get("DOWNLOAD_URL_EXPIRY_DAYS").and_then(|v| parse_env("DOWNLOAD_URL_EXPIRY_DAYS", &v)) {
            self.download_url_expiry_days = days;
        }
        if let Some(key) = get("POSTMARK_API_KEY") {
            self.postmark_api_key = Some(key);
        }
        if let Some(from) = get("POSTMARK_FROM_EMAIL") {
            self.postmark_from_email = Some(from);
        }
        if let Some(mb) = get("MAX_FILE_SIZE_MB").and_then(|v| parse_env("MAX_FILE_SIZE_MB", &v)) {
            self.max_file_size_mb = Some(mb);
        }
        if let Some(limit) = get("RATE_LIMIT_PER_HOUR").and_then(|v| parse_env("RATE_LIMIT_PER_HOUR", &v)) {
            self.rate_limit_per_hour = limit;
        }
        if let Some(ratio) = get("BEO_MARGIN_RATIO")
            .and_then(|v| parse_env("BEO_MARGIN_RATIO", &v))
            .and_then(|r| checked_margin_ratio("BEO_MARGIN_RATIO", r))
        {
            self.split.margin_ratio = ratio;
        }
        if let Some(flag) = get("BEO_STOP_ON_PROBLEMS") {
            self.split.stop_on_problems = is_truthy(&flag);
        }
        if let Some(flag) = get("BEO_OCR_ENABLED") {
            self.split.ocr_enabled = is_truthy(&flag);
        }
        if let Some(cmd) = get("BEO_OCR_COMMAND") {
            self.split.ocr_command = cmd;
        }
        if let Some(secs) = get("BEO_OCR_TIMEOUT_SECS").and_then(|v| parse_env("BEO_OCR_TIMEOUT_SECS", &v)) {
            self.split.ocr_timeout_secs = secs;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {}", key, value);
            None
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Split a comma-separated origin list.
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_problems: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_timeout_secs: Option<u64>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bucket_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url_expiry_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_hour: Option<u32>,
    #[serde(default)]
    pub split: SplitConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers beo-split config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("beo-split").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref bind) = self.bind {
            settings.bind_address = bind.clone();
        }
        if let Some(ref url) = self.public_url {
            settings.public_base_url = url.clone();
        }
        if !self.cors_origins.is_empty() {
            settings.cors_origins = self.cors_origins.clone();
        }
        if let Some(ref bucket) = self.storage_bucket_name {
            settings.storage_bucket_name = bucket.clone();
        }
        if let Some(days) = self.download_url_expiry_days {
            settings.download_url_expiry_days = days;
        }
        if let Some(mb) = self.max_file_size_mb {
            settings.max_file_size_mb = Some(mb);
        }
        if let Some(limit) = self.rate_limit_per_hour {
            settings.rate_limit_per_hour = limit;
        }

        let split = &mut settings.split;
        if let Some(ratio) = self
            .split
            .margin_ratio
            .and_then(|r| checked_margin_ratio("config file", r))
        {
            split.margin_ratio = ratio;
        }
        if let Some(stop) = self.split.stop_on_problems {
            split.stop_on_problems = stop;
        }
        if let Some(ocr) = self.split.ocr {
            split.ocr_enabled = ocr;
        }
        if let Some(ref cmd) = self.split.ocr_command {
            split.ocr_command = cmd.clone();
        }
        if let Some(secs) = self.split.ocr_timeout_secs {
            split.ocr_timeout_secs = secs;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings: defaults, then config file, then environment.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env();

    (settings, config)
}
