//! Process-wide configuration, built once at startup and passed by reference
//! into every component constructor.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://api.box.com/2.0";
pub const DEFAULT_UPLOAD_BASE: &str = "https://upload.box.com/api/2.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// File and folder names the mesh conventions are keyed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WellKnownNames {
    pub memory: String,
    pub ledger: String,
    pub shadow: String,
}

impl Default for WellKnownNames {
    fn default() -> Self {
        Self {
            memory: ".agent_memory.json".to_string(),
            ledger: ".reasoning_ledger.log".to_string(),
            shadow: "[SHADOW]".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MeshConfig {
    pub access_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub enterprise_id: Option<String>,
    pub api_base: String,
    pub upload_base: String,
    pub http_timeout: Duration,
    pub names: WellKnownNames,
}

impl MeshConfig {
    /// Configuration with the given token and provider defaults for
    /// everything else.
    pub fn new(access_token: impl Into<String>) -> Result<Self, ConfigError> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        Ok(Self {
            access_token,
            client_id: None,
            client_secret: None,
            enterprise_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            names: WellKnownNames::default(),
        })
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables. Unset or empty values fall
    /// back to defaults; only `BOX_ACCESS_TOKEN` is mandatory.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        let token = vars
            .get("BOX_ACCESS_TOKEN")
            .cloned()
            .ok_or(ConfigError::MissingAccessToken)?;
        let mut config = Self::new(token)?;
        config.client_id = vars.get("BOX_CLIENT_ID").cloned();
        config.client_secret = vars.get("BOX_CLIENT_SECRET").cloned();
        config.enterprise_id = vars.get("BOX_ENTERPRISE_ID").cloned();
        if let Some(base) = vars.get("BOX_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(base) = vars.get("BOX_UPLOAD_BASE") {
            config.upload_base = base.trim_end_matches('/').to_string();
        }
        if let Some(raw) = vars.get("AGENT_MESH_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "AGENT_MESH_HTTP_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.http_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Point both API bases at a single endpoint, as a local test server
    /// serves both under one address.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base = base.to_string();
        self.upload_base = base.to_string();
        self
    }
}
