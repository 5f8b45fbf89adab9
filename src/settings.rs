use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use dotenv::dotenv;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    constants::{DEFAULT_ACTIVITY_LOG_CAP, UPLOAD_LOG_INTERVAL_SECS},
    domain::date_grouping::{DateKey, EpochConvention, DEFAULT_EPOCH},
};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Production,
    Testing,
}

impl FromStr for AppEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(AppEnvironment::Development),
            "production" => Ok(AppEnvironment::Production),
            "testing" => Ok(AppEnvironment::Testing),
            _ => Err(ConfigError::Message(format!("Invalid environment: {}", s))),
        }
    }
}

/// Connection details for the shared realtime document store.
#[derive(Deserialize, Clone, Default, PartialEq)]
pub struct RemoteCredentials {
    #[serde(default)]
    pub url: String,
    /// Key prefix isolating one family's documents.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl RemoteCredentials {
    pub fn new(url: impl Into<String>, namespace: impl Into<String>) -> Self {
        RemoteCredentials { url: url.into(), namespace: namespace.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty() && !self.namespace.trim().is_empty()
    }
}

#[derive(Deserialize, Clone)]
pub struct CloudinaryConfig {
    #[serde(default)]
    pub cloud_name: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_secret: Option<String>,

    #[serde(default = "default_image_preset")]
    pub image_preset: String,

    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    #[serde(default = "default_cloudinary_endpoint")]
    pub upload_endpoint: String,

    #[serde(default = "default_cloudinary_endpoint")]
    pub admin_endpoint: String,
}

impl CloudinaryConfig {
    /// Admin credentials, only when all three parts are present.
    pub fn admin_credentials(&self) -> Option<(&str, &str, &str)> {
        let key = self.api_key.as_deref().filter(|k| !k.is_empty())?;
        let secret = self.api_secret.as_deref().filter(|s| !s.is_empty())?;
        let cloud = Some(self.cloud_name.as_str()).filter(|c| !c.is_empty())?;
        Some((cloud, key, secret))
    }
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        CloudinaryConfig {
            cloud_name: String::new(),
            api_key: None,
            api_secret: None,
            image_preset: default_image_preset(),
            video_preset: default_video_preset(),
            upload_endpoint: default_cloudinary_endpoint(),
            admin_endpoint: default_cloudinary_endpoint(),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: AppEnvironment,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub use_remote: bool,

    #[serde(default)]
    pub remote: Option<RemoteCredentials>,

    #[serde(default)]
    pub cloudinary: CloudinaryConfig,

    #[serde(default = "default_media_proxy_base")]
    pub media_proxy_base: String,

    #[serde(default = "default_epoch_date")]
    pub epoch_date: DateKey,

    #[serde(default)]
    pub epoch_convention: EpochConvention,

    #[serde(default = "default_members")]
    pub members: Vec<String>,

    #[serde(default = "default_albums")]
    pub default_albums: Vec<String>,

    #[serde(default = "default_upload_log_interval")]
    pub upload_log_interval_secs: u64,

    #[serde(default = "default_activity_log_cap")]
    pub activity_log_cap: usize,

    #[serde(default = "default_recount_interval")]
    pub recount_interval_secs: u64,
}

fn default_env() -> AppEnvironment {
    AppEnvironment::Development
}
fn default_name() -> String {
    "Family-Album".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_worker_count() -> usize {
    num_cpus::get()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_namespace() -> String {
    "family".to_string()
}
fn default_image_preset() -> String {
    "family_img".to_string()
}
fn default_video_preset() -> String {
    "family_video".to_string()
}
fn default_cloudinary_endpoint() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}
fn default_media_proxy_base() -> String {
    "http://127.0.0.1:8888".to_string()
}
fn default_epoch_date() -> DateKey {
    DEFAULT_EPOCH
}
fn default_members() -> Vec<String> {
    ["👨‍💼 아빠", "👩‍💼 엄마", "🌟 아기", "👵 할머니", "👴 할아버지"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
fn default_albums() -> Vec<String> {
    ["100일", "첫걸음마", "돌잔치", "어린이집"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
fn default_upload_log_interval() -> u64 {
    UPLOAD_LOG_INTERVAL_SECS
}
fn default_activity_log_cap() -> usize {
    DEFAULT_ACTIVITY_LOG_CAP
}
fn default_recount_interval() -> u64 {
    60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            env: default_env(),
            name: default_name(),
            port: default_port(),
            host: default_host(),
            worker_count: default_worker_count(),
            data_dir: default_data_dir(),
            use_remote: false,
            remote: None,
            cloudinary: CloudinaryConfig::default(),
            media_proxy_base: default_media_proxy_base(),
            epoch_date: default_epoch_date(),
            epoch_convention: EpochConvention::default(),
            members: default_members(),
            default_albums: default_albums(),
            upload_log_interval_secs: default_upload_log_interval(),
            activity_log_cap: default_activity_log_cap(),
            recount_interval_secs: default_recount_interval(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv().ok();

        let raw_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let env_name = AppEnvironment::from_str(&raw_env)
            .map_err(|_| ConfigError::Message(format!("Invalid APP_ENV value: {}", raw_env)))?;

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env_name.to_string().to_lowercase())).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("members")
                    .with_list_parse_key("default_albums"),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        config.env = env_name;

        // Flat env names for the remote store, as documented in .env files
        if config.remote.is_none() {
            if let Ok(url) = env::var("APP_REMOTE_URL") {
                let namespace = env::var("APP_REMOTE_NAMESPACE").unwrap_or_else(|_| default_namespace());
                config.remote = Some(RemoteCredentials::new(url, namespace));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("PORT must be non-zero");
        }
        if self.members.is_empty() {
            errors.push("MEMBERS must list at least one family member");
        }
        if self.activity_log_cap == 0 {
            errors.push("ACTIVITY_LOG_CAP must be positive");
        }
        if self.is_production() && self.cloudinary.admin_credentials().is_none() {
            errors.push("Cloudinary admin credentials are required in production");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(errors.join(", ")))
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnvironment::Production
    }

    pub fn upload_log_interval(&self) -> Duration {
        Duration::from_secs(self.upload_log_interval_secs)
    }

    pub fn recount_interval(&self) -> Duration {
        Duration::from_secs(self.recount_interval_secs.max(1))
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Production => "production",
            AppEnvironment::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

trait Redact {
    fn redact(&self) -> &str;
}

impl Redact for str {
    fn redact(&self) -> &str {
        if self.is_empty() {
            "[MISSING]"
        } else {
            "[REDACTED]"
        }
    }
}

impl Redact for Option<String> {
    fn redact(&self) -> &str {
        self.as_deref().unwrap_or_default().redact()
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url.redact())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key.redact())
            .field("api_secret", &self.api_secret.redact())
            .field("image_preset", &self.image_preset)
            .field("video_preset", &self.video_preset)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("admin_endpoint", &self.admin_endpoint)
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("host", &self.host)
            .field("worker_count", &self.worker_count)
            .field("data_dir", &self.data_dir)
            .field("use_remote", &self.use_remote)
            .field("remote", &self.remote)
            .field("cloudinary", &self.cloudinary)
            .field("media_proxy_base", &self.media_proxy_base)
            .field("epoch_date", &self.epoch_date)
            .field("epoch_convention", &self.epoch_convention)
            .field("members", &self.members)
            .field("upload_log_interval_secs", &self.upload_log_interval_secs)
            .field("activity_log_cap", &self.activity_log_cap)
            .finish()
    }
}
