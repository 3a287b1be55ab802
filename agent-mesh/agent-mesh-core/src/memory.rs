//! Agent memory: one JSON object per folder, fully replaced on every write.
//!
//! Memory is lenient. Provider failures never leave this module; they come
//! back as [`MemoryRead::Failed`] / [`MemoryWrite::Failed`] with a warning
//! logged, so callers can carry on with empty context.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use ring::digest::{digest, SHA256};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::MeshConfig;
use crate::error::ProviderError;
use crate::gateway::{ItemKind, StorageGateway};
use crate::lookup::locate;

pub type MemoryRecord = Map<String, Value>;

/// Content hash of a stored memory file, used for conditional writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn of(content: &[u8]) -> Self {
        let hash = digest(&SHA256, content);
        Revision(hash.as_ref().iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Revision(value)
    }
}

/// Why a memory operation produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum MemoryFault {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("memory file is not a JSON object: {0}")]
    Malformed(String),
}

#[derive(Debug)]
pub enum MemoryRead {
    Found {
        record: MemoryRecord,
        revision: Revision,
    },
    Absent,
    Failed(MemoryFault),
}

impl MemoryRead {
    /// The stored record, or an empty one when absent or unreadable.
    pub fn into_record(self) -> MemoryRecord {
        match self {
            MemoryRead::Found { record, .. } => record,
            MemoryRead::Absent | MemoryRead::Failed(_) => MemoryRecord::new(),
        }
    }

    pub fn revision(&self) -> Option<&Revision> {
        match self {
            MemoryRead::Found { revision, .. } => Some(revision),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum MemoryWrite {
    Created { revision: Revision },
    Replaced { revision: Revision },
    /// Conditional write refused; `current` is what is stored now.
    Conflict { current: Option<Revision> },
    Failed(MemoryFault),
}

impl MemoryWrite {
    pub fn is_written(&self) -> bool {
        matches!(self, MemoryWrite::Created { .. } | MemoryWrite::Replaced { .. })
    }
}

pub struct MemoryStore {
    gateway: Arc<dyn StorageGateway>,
    file_name: String,
}

impl MemoryStore {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &MeshConfig) -> Self {
        Self {
            gateway,
            file_name: config.names.memory.clone(),
        }
    }

    pub async fn read(&self, folder_id: &str) -> MemoryRead {
        match self.try_read(folder_id).await {
            Ok(Some((record, revision))) => MemoryRead::Found { record, revision },
            Ok(None) => MemoryRead::Absent,
            Err(fault) => {
                warn!(folder_id, error = %fault, "error reading memory");
                MemoryRead::Failed(fault)
            }
        }
    }

    /// Replace the folder's memory with `record`.
    pub async fn write(&self, folder_id: &str, record: &MemoryRecord) -> MemoryWrite {
        match self.try_write(folder_id, record, None).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                warn!(folder_id, error = %fault, "error writing memory");
                MemoryWrite::Failed(fault)
            }
        }
    }

    /// Replace the folder's memory only if it still has revision `expected`
    /// (`None`: only if no memory exists yet). The check and the write are
    /// separate provider calls, so a concurrent writer can still slip in
    /// between them.
    pub async fn write_if(
        &self,
        folder_id: &str,
        record: &MemoryRecord,
        expected: Option<&Revision>,
    ) -> MemoryWrite {
        match self.try_write(folder_id, record, Some(expected)).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                warn!(folder_id, error = %fault, "error writing memory");
                MemoryWrite::Failed(fault)
            }
        }
    }

    async fn try_read(
        &self,
        folder_id: &str,
    ) -> Result<Option<(MemoryRecord, Revision)>, MemoryFault> {
        let Some(file) = locate(&*self.gateway, folder_id, &self.file_name, ItemKind::File).await?
        else {
            return Ok(None);
        };
        let content = self.gateway.read_file_content(&file.id).await?;
        let record = match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(MemoryFault::Malformed(format!(
                    "expected an object, found {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(MemoryFault::Malformed(e.to_string())),
        };
        Ok(Some((record, Revision::of(&content))))
    }

    async fn try_write(
        &self,
        folder_id: &str,
        record: &MemoryRecord,
        expected: Option<Option<&Revision>>,
    ) -> Result<MemoryWrite, MemoryFault> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| MemoryFault::Malformed(e.to_string()))?;
        let revision = Revision::of(&body);
        let existing = locate(&*self.gateway, folder_id, &self.file_name, ItemKind::File).await?;

        if let Some(expected) = expected {
            let current = match &existing {
                Some(file) => Some(Revision::of(
                    &self.gateway.read_file_content(&file.id).await?,
                )),
                None => None,
            };
            if current.as_ref() != expected {
                debug!(folder_id, "memory revision changed, refusing write");
                return Ok(MemoryWrite::Conflict { current });
            }
        }

        match existing {
            Some(file) => {
                self.gateway.update_file(&file.id, Bytes::from(body)).await?;
                debug!(folder_id, "memory replaced");
                Ok(MemoryWrite::Replaced { revision })
            }
            None => {
                self.gateway
                    .upload_file(folder_id, &self.file_name, Bytes::from(body))
                    .await?;
                debug!(folder_id, "memory created");
                Ok(MemoryWrite::Created { revision })
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
