use std::fmt;

use thiserror::Error;

/// Raised while building the configuration or a provider client.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BOX_ACCESS_TOKEN is required")]
    MissingAccessToken,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Any failure reported by the storage provider or the transport to it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct ProviderError {
    /// HTTP-style status, absent for transport failures.
    pub status: Option<u16>,
    /// Provider specific error code, e.g. `item_name_in_use`.
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(404, "not_found", format!("{what} not found"))
    }

    pub fn conflict(name: &str) -> Self {
        Self::new(
            409,
            "item_name_in_use",
            format!("an item named {name:?} already exists"),
        )
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "provider error {status} ({code}): {}", self.message),
            (Some(status), None) => write!(f, "provider error {status}: {}", self.message),
            _ => write!(f, "provider unreachable: {}", self.message),
        }
    }
}

/// Failures propagated by the strict components (ledger, shadow staging).
#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("ledger line {line} is not a valid entry: {source}")]
    MalformedLedger {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Commit(#[from] crate::shadow::CommitError),
    /// The shadow was fully merged and removed, but the ledger entry for it
    /// could not be written.
    #[error("commit applied but not recorded in the ledger: {source}")]
    CommitUnaudited {
        report: crate::shadow::CommitReport,
        #[source]
        source: Box<MeshError>,
    },
    #[error("failed to encode: {0}")]
    Encode(#[from] serde_json::Error),
}
