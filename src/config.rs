use crate::http::{HttpSettings, RetryPolicy};
use std::{collections::HashMap, env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// How many images a product folder may hold before it is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePolicy {
    /// Use the first image the storage API returns; extras are ignored.
    #[default]
    FirstWins,
    /// Skip folders that contain more than one image.
    RequireSingle,
}

impl FromStr for ImagePolicy {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "first" | "first_wins" => Ok(Self::FirstWins),
            "single" | "require_single" => Ok(Self::RequireSingle),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub service_account_file: PathBuf,
    pub unprocessed_folder_id: String,
    pub processed_folder_id: String,
    pub image_policy: ImagePolicy,
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct EtsyConfig {
    pub api_base: String,
    pub api_key: String,
    pub shop_id: String,
    pub access_token: Option<String>,
    pub taxonomy_id: u64,
    pub shipping_profile_id: Option<u64>,
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub drive: DriveConfig,
    pub llm: LlmConfig,
    pub etsy: EtsyConfig,
    pub download_root: PathBuf,
    pub watch_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::Process)
    }

    fn from_source(source: &EnvSource) -> Result<Self, ConfigError> {
        let connect_timeout = Duration::from_secs(source.parse_or("HTTP_CONNECT_TIMEOUT_SECS", 5)?);
        let base_delay = Duration::from_millis(source.parse_or("RETRY_BASE_DELAY_MS", 500)?);
        let settings = |timeout_key: &'static str,
                        timeout_default: u64,
                        attempts_key: &'static str,
                        attempts_default: u32| {
            Ok::<_, ConfigError>(HttpSettings {
                timeout: Duration::from_secs(source.parse_or(timeout_key, timeout_default)?),
                connect_timeout,
                retry: RetryPolicy {
                    max_attempts: source.parse_or(attempts_key, attempts_default)?,
                    base_delay,
                },
            })
        };

        let drive = DriveConfig {
            service_account_file: source
                .get("GOOGLE_SERVICE_ACCOUNT_FILE")
                .unwrap_or_else(|| "service-account-key.json".into())
                .into(),
            unprocessed_folder_id: source.require("UNPROCESSED_FOLDER_ID")?,
            processed_folder_id: source.require("PROCESSED_FOLDER_ID")?,
            image_policy: source.parse_or("FOLDER_IMAGE_POLICY", ImagePolicy::default())?,
            http: settings("DRIVE_TIMEOUT_SECS", 30, "DRIVE_MAX_ATTEMPTS", 3)?,
        };

        let llm = LlmConfig {
            base_url: source
                .get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: source.require("OPENAI_API_KEY")?,
            model: source.get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".into()),
            temperature: source.parse_or("OPENAI_TEMPERATURE", 0.7)?,
            max_tokens: source.parse_or("OPENAI_MAX_TOKENS", 1000)?,
            http: settings("OPENAI_TIMEOUT_SECS", 120, "OPENAI_MAX_ATTEMPTS", 2)?,
        };

        let etsy = EtsyConfig {
            api_base: source
                .get("ETSY_API_BASE")
                .unwrap_or_else(|| "https://openapi.etsy.com/v3/application".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: source.require("ETSY_API_KEY")?,
            shop_id: source.require("ETSY_SHOP_ID")?,
            access_token: source.get("ETSY_ACCESS_TOKEN"),
            taxonomy_id: source.parse_or("ETSY_TAXONOMY_ID", 687)?,
            shipping_profile_id: source.parse_opt("ETSY_SHIPPING_PROFILE_ID")?,
            http: settings("ETSY_TIMEOUT_SECS", 60, "ETSY_MAX_ATTEMPTS", 2)?,
        };

        Ok(Self {
            drive,
            llm,
            etsy,
            download_root: source
                .get("DOWNLOAD_ROOT")
                .unwrap_or_else(|| "temp".into())
                .into(),
            watch_interval: Duration::from_secs(source.parse_or("WATCH_INTERVAL_SECS", 60)?),
        })
    }
}

/// Where configuration values come from. Tests feed a map instead of the
/// process environment.
enum EnvSource {
    Process,
    #[cfg_attr(not(test), allow(dead_code))]
    Map(HashMap<&'static str, String>),
}

impl EnvSource {
    fn get(&self, name: &'static str) -> Option<String> {
        let value = match self {
            EnvSource::Process => env::var(name).ok(),
            EnvSource::Map(map) => map.get(name).cloned(),
        };
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse_opt<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(name) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid { name, value }),
            None => Ok(None),
        }
    }

    fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_opt(name)?.unwrap_or(default))
    }
}
