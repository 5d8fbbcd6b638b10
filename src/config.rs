//! Configuration loading and validation.
//!
//! Values are layered, lowest priority first:
//! 1. Built-in defaults ([`Configuration::default`])
//! 2. The TOML config file ([`FileConfig`])
//! 3. Credential environment variables
//! 4. Command-line flags (applied by the binary)
//!
//! The resulting [`Configuration`] is passed explicitly into every
//! constructor; nothing reads configuration from global state.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cache::{DEFAULT_MAX_AGE, DEFAULT_MAX_BYTES};
use crate::download::{DEFAULT_AUDIO_FORMAT, DEFAULT_AUDIO_QUALITY, DEFAULT_CONCURRENCY};
use crate::http_client::HttpTimeouts;
use crate::provider::DEFAULT_OLLAMA_HOST;
use crate::search::{DEFAULT_YTDLP_BINARY, PlausibilityWindow};

/// Directory name used under the config, cache and music roots.
pub const APP_DIR_NAME: &str = "mixhound";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Audio formats the transfer tool can produce.
const AUDIO_FORMATS: &[&str] = &["best", "aac", "flac", "m4a", "mp3", "opus", "vorbis", "wav"];

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("Failed to parse config file '{}': {source}\n  Suggestion: Compare the file with `mixhound config --example`", .path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its allowed range.
    #[error("Invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Value found.
        value: String,
        /// Allowed values.
        expected: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// API keys for hosted services.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Credentials {
    /// `OPENAI_API_KEY`.
    pub openai: Option<String>,
    /// `PERPLEXITY_API_KEY`.
    pub perplexity: Option<String>,
    /// `COHERE_API_KEY`.
    pub cohere: Option<String>,
    /// `REPLICATE_API_TOKEN`.
    pub replicate: Option<String>,
    /// `HUGGINGFACE_API_KEY`.
    pub huggingface: Option<String>,
    /// `YOUTUBE_API_KEY`.
    pub youtube: Option<String>,
}

impl Credentials {
    /// Environment variable for each credential, in field order.
    pub const ENV_VARS: [&'static str; 6] = [
        "OPENAI_API_KEY",
        "PERPLEXITY_API_KEY",
        "COHERE_API_KEY",
        "REPLICATE_API_TOKEN",
        "HUGGINGFACE_API_KEY",
        "YOUTUBE_API_KEY",
    ];

    fn slots_mut(&mut self) -> [&mut Option<String>; 6] {
        [
            &mut self.openai,
            &mut self.perplexity,
            &mut self.cohere,
            &mut self.replicate,
            &mut self.huggingface,
            &mut self.youtube,
        ]
    }

    /// Overwrites each credential whose environment variable is set and non-blank.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (slot, var) in self.slots_mut().into_iter().zip(Self::ENV_VARS) {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value.trim().to_string());
            }
        }
    }

    fn merge_from(&mut self, other: &Self) {
        let others = [
            &other.openai,
            &other.perplexity,
            &other.cohere,
            &other.replicate,
            &other.huggingface,
            &other.youtube,
        ];
        for (slot, value) in self.slots_mut().into_iter().zip(others) {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                *slot = Some(value.trim().to_string());
            }
        }
    }
}

// Keys never appear in debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai", &mask(&self.openai))
            .field("perplexity", &mask(&self.perplexity))
            .field("cohere", &mask(&self.cohere))
            .field("replicate", &mask(&self.replicate))
            .field("huggingface", &mask(&self.huggingface))
            .field("youtube", &mask(&self.youtube))
            .finish()
    }
}

/// Model name per provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModels {
    /// OpenAI chat model.
    pub openai: String,
    /// Perplexity chat model.
    pub perplexity: String,
    /// Cohere chat model.
    pub cohere: String,
    /// Replicate model (`owner/name`).
    pub replicate: String,
    /// Hugging Face model id.
    pub huggingface: String,
    /// Ollama model tag.
    pub ollama: String,
}

impl Default for ProviderModels {
    fn default() -> Self {
        Self {
            openai: "gpt-3.5-turbo".to_string(),
            perplexity: "mixtral-8x7b-instruct".to_string(),
            cohere: "command".to_string(),
            replicate: "meta/llama-2-70b-chat".to_string(),
            huggingface: "facebook/opt-350m".to_string(),
            ollama: "llama2".to_string(),
        }
    }
}

/// `[models]` table; every key optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileModels {
    /// OpenAI chat model.
    pub openai: Option<String>,
    /// Perplexity chat model.
    pub perplexity: Option<String>,
    /// Cohere chat model.
    pub cohere: Option<String>,
    /// Replicate model.
    pub replicate: Option<String>,
    /// Hugging Face model id.
    pub huggingface: Option<String>,
    /// Ollama model tag.
    pub ollama: Option<String>,
}

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    /// Directory downloads are written to.
    pub music_dir: Option<PathBuf>,
    /// Directory for cached provider and search results.
    pub cache_dir: Option<PathBuf>,
    /// Cache entry lifetime in seconds.
    pub cache_max_age_secs: Option<u64>,
    /// Cache size bound in MiB.
    pub cache_max_mb: Option<u64>,
    /// Concurrent downloads (1..=8).
    pub concurrency: Option<usize>,
    /// Path or name of the yt-dlp binary.
    pub ytdlp_path: Option<String>,
    /// Audio container for downloads.
    pub audio_format: Option<String>,
    /// Audio bitrate passed to yt-dlp, e.g. `192K`.
    pub audio_quality: Option<String>,
    /// Shortest plausible song in seconds.
    pub min_duration_secs: Option<u64>,
    /// Longest plausible song in seconds.
    pub max_duration_secs: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Ollama base URL.
    pub ollama_host: Option<String>,
    /// `[credentials]` table.
    pub credentials: Option<Credentials>,
    /// `[models]` table.
    pub models: Option<FileModels>,
}

impl FileConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for syntax errors or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(concurrency) = self.concurrency
            && !(1..=8).contains(&concurrency)
        {
            return Err(ConfigError::invalid("concurrency", concurrency, "range: 1..=8"));
        }
        if let Some(mb) = self.cache_max_mb
            && !(1..=102_400).contains(&mb)
        {
            return Err(ConfigError::invalid("cache_max_mb", mb, "range: 1..=102400"));
        }
        if let Some(age) = self.cache_max_age_secs
            && age == 0
        {
            return Err(ConfigError::invalid("cache_max_age_secs", age, "a positive number of seconds"));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        let window = PlausibilityWindow::default();
        let min = self.min_duration_secs.unwrap_or(window.min_secs);
        let max = self.max_duration_secs.unwrap_or(window.max_secs);
        if min == 0 || min >= max {
            return Err(ConfigError::invalid(
                "min_duration_secs",
                format!("{min} (max_duration_secs = {max})"),
                "0 < min_duration_secs < max_duration_secs",
            ));
        }

        if let Some(format) = &self.audio_format
            && !AUDIO_FORMATS.contains(&format.as_str())
        {
            return Err(ConfigError::invalid(
                "audio_format",
                format,
                format!("one of: {}", AUDIO_FORMATS.join(", ")),
            ));
        }
        if let Some(host) = &self.ollama_host {
            validate_http_url("ollama_host", host)?;
        }
        if let Some(path) = &self.ytdlp_path
            && path.trim().is_empty()
        {
            return Err(ConfigError::invalid("ytdlp_path", "\"\"", "a binary name or path"));
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(field, value, "range: 1..=3600"));
    }
    Ok(())
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ConfigError::invalid(field, value, "an http:// or https:// URL")),
    }
}

/// Effective runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Directory downloads and the ledger live in.
    pub music_dir: PathBuf,
    /// Cache directory.
    pub cache_dir: PathBuf,
    /// Cache entry lifetime.
    pub cache_max_age: Duration,
    /// Cache size bound in bytes.
    pub cache_max_bytes: u64,
    /// Concurrent downloads.
    pub concurrency: usize,
    /// yt-dlp binary.
    pub ytdlp_path: String,
    /// Download audio container.
    pub audio_format: String,
    /// Download audio bitrate.
    pub audio_quality: String,
    /// Accepted durations for recommended songs.
    pub plausibility_window: PlausibilityWindow,
    /// HTTP timeouts for providers and the search API.
    pub http_timeouts: HttpTimeouts,
    /// Ollama base URL.
    pub ollama_host: String,
    /// API keys.
    pub credentials: Credentials,
    /// Model per provider.
    pub models: ProviderModels,
}

impl Default for Configuration {
    /// Built-in defaults. Reads no files and no credentials.
    fn default() -> Self {
        let music_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Music")
            .join(APP_DIR_NAME);
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join(APP_DIR_NAME);
        Self {
            music_dir,
            cache_dir,
            cache_max_age: DEFAULT_MAX_AGE,
            cache_max_bytes: DEFAULT_MAX_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
            ytdlp_path: DEFAULT_YTDLP_BINARY.to_string(),
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
            plausibility_window: PlausibilityWindow::default(),
            http_timeouts: HttpTimeouts::default(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            credentials: Credentials::default(),
            models: ProviderModels::default(),
        }
    }
}

impl Configuration {
    /// Applies a validated file config over the defaults.
    #[must_use]
    pub fn from_file_config(file: &FileConfig) -> Self {
        let mut config = Self::default();
        if let Some(dir) = &file.music_dir {
            config.music_dir = expand_home(dir);
        }
        if let Some(dir) = &file.cache_dir {
            config.cache_dir = expand_home(dir);
        }
        if let Some(secs) = file.cache_max_age_secs {
            config.cache_max_age = Duration::from_secs(secs);
        }
        if let Some(mb) = file.cache_max_mb {
            config.cache_max_bytes = mb.saturating_mul(BYTES_PER_MIB);
        }
        if let Some(concurrency) = file.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(path) = &file.ytdlp_path {
            config.ytdlp_path.clone_from(path);
        }
        if let Some(format) = &file.audio_format {
            config.audio_format.clone_from(format);
        }
        if let Some(quality) = &file.audio_quality {
            config.audio_quality.clone_from(quality);
        }
        if let Some(min) = file.min_duration_secs {
            config.plausibility_window.min_secs = min;
        }
        if let Some(max) = file.max_duration_secs {
            config.plausibility_window.max_secs = max;
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.http_timeouts.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.read_timeout_secs {
            config.http_timeouts.read_timeout_secs = secs;
        }
        if let Some(host) = &file.ollama_host {
            config.ollama_host = host.trim_end_matches('/').to_string();
        }
        if let Some(credentials) = &file.credentials {
            config.credentials.merge_from(credentials);
        }
        if let Some(models) = &file.models {
            let targets = [
                (&mut config.models.openai, &models.openai),
                (&mut config.models.perplexity, &models.perplexity),
                (&mut config.models.cohere, &models.cohere),
                (&mut config.models.replicate, &models.replicate),
                (&mut config.models.huggingface, &models.huggingface),
                (&mut config.models.ollama, &models.ollama),
            ];
            for (slot, value) in targets {
                if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                    *slot = value.trim().to_string();
                }
            }
        }
        config
    }

    /// Loads the default config file (if any) and applies credential
    /// environment variables on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load() -> Result<LoadedConfig, ConfigError> {
        let path = resolve_default_config_path();
        let file = match path.as_deref() {
            Some(path) if path.exists() => Some(load_file_config(path)?),
            _ => None,
        };
        let mut config = file
            .as_ref()
            .map_or_else(Self::default, Self::from_file_config);
        config.credentials.apply_env(|name| env::var(name).ok());
        debug!(
            path = ?path,
            loaded_from_file = file.is_some(),
            "Configuration loaded"
        );
        Ok(LoadedConfig {
            path,
            loaded_from_file: file.is_some(),
            config,
        })
    }
}

/// Result of [`Configuration::load`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Whether the file existed and was applied.
    pub loaded_from_file: bool,
    /// Effective configuration.
    pub config: Configuration,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mixhound/config.toml`
/// 2. `$HOME/.config/mixhound/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Reads and validates a config file.
///
/// # Errors
///
/// See [`FileConfig::from_toml_str`]; read failures become [`ConfigError::Read`].
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml_str(&raw, path)
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

/// Example config file contents.
pub const EXAMPLE_CONFIG: &str = r#"# mixhound configuration
# music_dir = "~/Music/mixhound"
# cache_dir = "~/.cache/mixhound"
# cache_max_age_secs = 3600
# cache_max_mb = 100
# concurrency = 3
# ytdlp_path = "yt-dlp"
# audio_format = "mp3"
# audio_quality = "192K"
# min_duration_secs = 60
# max_duration_secs = 600
# connect_timeout_secs = 10
# read_timeout_secs = 30
# ollama_host = "http://localhost:11434"

# [credentials]            # environment variables take precedence
# openai = "sk-..."
# youtube = "AIza..."

# [models]
# openai = "gpt-3.5-turbo"
# ollama = "llama2"
"#;
