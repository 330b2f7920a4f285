use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::secrets::{expand_home, resolve_secret, SecretError};

pub const DEFAULT_BASE_URL: &str = "https://api.ttapi.io/midjourney/v1";
pub const DEFAULT_API_KEY_ENV_VAR: &str = "TTAPI_API_KEY";
pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: String,
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub api_key: ApiKeyConfig,
}

fn default_metadata_dir() -> String {
    "~/.crc/metadata".to_string()
}

fn default_image_dir() -> String {
    "~/.crc/images".to_string()
}

fn default_state_dir() -> String {
    "~/.crc/state".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            metadata_dir: default_metadata_dir(),
            image_dir: default_image_dir(),
            state_dir: default_state_dir(),
            vendor: VendorConfig::default(),
            api_key: ApiKeyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config rooted at `base`, with the usual `metadata`/`images`/`state`
    /// subdirectories.
    pub fn with_base_dir<P: Into<PathBuf>>(base: P) -> Self {
        let base = base.into();
        Self {
            metadata_dir: base.join("metadata").to_string_lossy().into_owned(),
            image_dir: base.join("images").to_string_lossy().into_owned(),
            state_dir: base.join("state").to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.metadata_dir))
    }

    pub fn image_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.image_dir))
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.state_dir))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries_per_poll")]
    pub retries_per_poll: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Generation speed passed to `/imagine`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub hook_url: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_timeout() -> u64 {
    300
}

fn default_retries_per_poll() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_mode() -> String {
    "fast".to_string()
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            retries_per_poll: default_retries_per_poll(),
            request_timeout_secs: default_request_timeout(),
            mode: default_mode(),
            hook_url: None,
        }
    }
}

/// Where the TTAPI key comes from: direct value, then file, then env var.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "default_env_var")]
    pub env_var: Option<String>,
}

fn default_env_var() -> Option<String> {
    Some(DEFAULT_API_KEY_ENV_VAR.to_string())
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            value: None,
            file: None,
            env_var: default_env_var(),
        }
    }
}

impl ApiKeyConfig {
    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env_var.as_deref(),
        )
    }
}
