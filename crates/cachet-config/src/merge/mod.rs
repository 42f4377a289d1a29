//! Configuration layering, file discovery, and environment overrides

use std::collections::HashMap;
use std::path::PathBuf;

use cachet_core::error::CacheError;
use camino::Utf8PathBuf;
use tracing::debug;

use crate::toml::CacheSettings;
use crate::ConfigResult;

/// Settings file name looked up from the working directory upwards
pub const CONFIG_FILE_NAME: &str = "cachet.toml";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering {
    /// Settings file contents
    file_settings: Option<CacheSettings>,
    /// Environment overrides
    env_overrides: HashMap<String, String>,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// cachet.toml file
    File(Utf8PathBuf),
    /// Defaults plus environment only
    Environment,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Find cachet.toml in the working directory or any parent
    pub fn find_config_file(&self) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Load settings from file (if any) and the process environment
    pub async fn load(&self) -> ConfigResult<(CacheSettings, ConfigSource)> {
        self.load_with_env(ConfigLayering::collect_env_overrides())
            .await
    }

    /// Load settings with an explicit environment
    pub async fn load_with_env(
        &self,
        env: HashMap<String, String>,
    ) -> ConfigResult<(CacheSettings, ConfigSource)> {
        let mut layering = ConfigLayering::new().with_env(env);

        let source = match self.find_config_file() {
            Some(path) => {
                debug!("Loading settings from {}", path);
                layering = layering.with_file(crate::toml::load_from_file(&path).await?);
                ConfigSource::File(path)
            },
            None => ConfigSource::Environment,
        };

        Ok((layering.resolve()?, source))
    }
}

impl ConfigLayering {
    /// Create a new configuration layering system
    pub fn new() -> Self {
        Self {
            file_settings: None,
            env_overrides: HashMap::new(),
        }
    }

    pub fn with_file(mut self, settings: CacheSettings) -> Self {
        self.file_settings = Some(settings);
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env_overrides = env;
        self
    }

    /// Merge the layers; environment wins over file, file over defaults
    pub fn resolve(self) -> ConfigResult<CacheSettings> {
        let mut merged = self.file_settings.unwrap_or_default();
        Self::apply_env_overrides(&mut merged, &self.env_overrides)?;
        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        settings: &mut CacheSettings,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "ACTIONS_CACHE_URL" => settings.service.cache_url = Some(value.clone()),
                "ACTIONS_RESULTS_URL" => settings.service.results_url = Some(value.clone()),
                "ACTIONS_RUNTIME_TOKEN" => settings.service.runtime_token = Some(value.clone()),
                "ACTIONS_CACHE_SERVICE_V2" => {
                    settings.service.service_v2 = parse_flag(value);
                },
                "GITHUB_SERVER_URL" => settings.service.server_url = Some(value.clone()),
                "GITHUB_WORKSPACE" => settings.archive.workspace = Some(PathBuf::from(value)),
                "CACHE_UPLOAD_CONCURRENCY" => {
                    settings.upload.concurrency = Some(parse_number(key, value)?);
                },
                "CACHE_UPLOAD_CHUNK_SIZE" => {
                    settings.upload.chunk_size_mb = Some(parse_number(key, value)?);
                },
                "SEGMENT_DOWNLOAD_TIMEOUT_MINS" => {
                    settings.download.segment_timeout_mins = Some(parse_number(key, value)?);
                },
                "CACHET_MAX_ARCHIVE_SIZE" => {
                    settings.archive.max_size = Some(parse_number(key, value)?);
                },
                "CACHET_COMPRESSION" => {
                    settings.archive.compression = Some(value.parse()?);
                },
                _ => {
                    // Unrelated environment variable, ignore
                },
            }
        }

        Ok(())
    }

    /// Collect the environment variables this crate understands
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| is_known_variable(key))
            .collect()
    }
}

impl Default for ConfigLayering {
    fn default() -> Self {
        Self::new()
    }
}

fn is_known_variable(key: &str) -> bool {
    key.starts_with("ACTIONS_")
        || key.starts_with("CACHET_")
        || matches!(
            key,
            "GITHUB_SERVER_URL"
                | "GITHUB_WORKSPACE"
                | "CACHE_UPLOAD_CONCURRENCY"
                | "CACHE_UPLOAD_CHUNK_SIZE"
                | "SEGMENT_DOWNLOAD_TIMEOUT_MINS"
        )
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| CacheError::ConfigValidation {
            field: key.to_string(),
            reason: format!("expected a number, got '{value}': {e}"),
        })
}
