use avrofilter_core::{
    ContentTypeClassifier, DEFAULT_NAMESPACE, MissingFieldPolicy, NOSTRIP_ROLES_KEY, PolicyModel,
    RETAIN_KEYS_SUFFIX,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for avrofilter, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Vendor namespace in `application/vnd.<namespace>.<datatype>.avro`
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub missing_fields: MissingFields,

    /// Comma-separated roles that always get unredacted data
    #[serde(default)]
    pub nostrip_roles: String,

    /// Role -> comma-separated `datatype:fieldname` tokens
    #[serde(default)]
    pub retain_keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFields {
    #[default]
    Reject,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Object store the proxy forwards requests to
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Believe `X-Roles` and `X-Identity-Status` sent by clients. Only turn
    /// this on behind an auth layer that sets those headers itself.
    #[serde(default)]
    pub trusted_identity_headers: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            missing_fields: MissingFields::default(),
            nostrip_roles: String::new(),
            retain_keys: BTreeMap::new(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: default_upstream(),
            trusted_identity_headers: false,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8089
}

fn default_upstream() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl From<MissingFields> for MissingFieldPolicy {
    fn from(value: MissingFields) -> Self {
        match value {
            MissingFields::Reject => MissingFieldPolicy::Reject,
            MissingFields::Ignore => MissingFieldPolicy::Ignore,
        }
    }
}

impl FilterConfig {
    /// Flatten into the `nostrip_roles` / `<role>_retain_keys` option surface
    pub fn options(&self) -> Vec<(String, String)> {
        let mut options = vec![(NOSTRIP_ROLES_KEY.to_string(), self.nostrip_roles.clone())];
        options.extend(
            self.retain_keys
                .iter()
                .map(|(role, keys)| (format!("{}{}", role, RETAIN_KEYS_SUFFIX), keys.clone())),
        );
        options
    }

    pub fn policy(&self) -> avrofilter_core::Result<PolicyModel> {
        PolicyModel::from_options(self.options())
    }

    pub fn classifier(&self) -> ContentTypeClassifier {
        ContentTypeClassifier::new(&self.namespace)
    }

    pub fn missing_field_policy(&self) -> MissingFieldPolicy {
        self.missing_fields.into()
    }
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            // Create default config file
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&path, content)?;
            Ok(config)
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("org", "caida", "avrofilter") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.avrofilter/config.toml")
        }
    }
}
