//! Reasoning ledger: an append-only audit trail of agent actions.
//!
//! One JSON object per line in the folder's ledger file. The gateway has no
//! append primitive, so every entry costs a full read of the current log,
//! a delete and a re-upload of the concatenation. Two concurrent loggers can
//! lose an entry; the last upload wins.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::gateway::{ItemKind, StorageGateway};
use crate::lookup::locate;


/// Optional LLM provenance recorded with an action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Provenance {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub reasoning: Option<String>,
}

impl Provenance {
    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: Some(reasoning.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub action: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub reasoning: Option<String>,
}

impl LedgerEntry {
    /// Stamp a new entry with the current UTC time.
    pub fn now(action: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            action: action.into(),
            prompt: provenance.prompt,
            model: provenance.model,
            reasoning: provenance.reasoning,
        }
    }

    fn to_line(&self) -> Result<Vec<u8>, MeshError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

pub struct Ledger {
    gateway: Arc<dyn StorageGateway>,
    file_name: String,
}

impl Ledger {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &MeshConfig) -> Self {
        Self {
            gateway,
            file_name: config.names.ledger.clone(),
        }
    }

    /// Append one entry for `action` to the folder's ledger.
    pub async fn log(
        &self,
        folder_id: &str,
        action: &str,
        provenance: Provenance,
    ) -> Result<LedgerEntry, MeshError> {
        let entry = LedgerEntry::now(action, provenance);
        self.append(folder_id, &entry).await?;
        Ok(entry)
    }

    /// Append a prebuilt entry. Earlier bytes of the log are carried over
    /// untouched.
    pub async fn append(&self, folder_id: &str, entry: &LedgerEntry) -> Result<(), MeshError> {
        let line = entry.to_line()?;
        let existing = locate(&*self.gateway, folder_id, &self.file_name, ItemKind::File).await?;

        let content = match existing {
            Some(file) => {
                let current = self.gateway.read_file_content(&file.id).await?;
                let mut joined = BytesMut::with_capacity(current.len() + line.len());
                joined.extend_from_slice(&current);
                joined.extend_from_slice(&line);
                self.gateway.delete_item(ItemKind::File, &file.id).await?;
                joined.freeze()
            }
            None => Bytes::from(line),
        };
        let size = content.len();
        self.gateway
            .upload_file(folder_id, &self.file_name, content)
            .await?;
        debug!(folder_id, action = %entry.action, size, "ledger entry appended");
        Ok(())
    }

    /// Every entry in the folder's ledger, oldest first.
    pub async fn entries(&self, folder_id: &str) -> Result<Vec<LedgerEntry>, MeshError> {
        let Some(file) = locate(&*self.gateway, folder_id, &self.file_name, ItemKind::File).await?
        else {
            return Ok(Vec::new());
        };
        let content = self.gateway.read_file_content(&file.id).await?;
        parse_entries(&content)
    }
}

/// Decode newline-delimited entries, skipping blank lines.
pub fn parse_entries(content: &[u8]) -> Result<Vec<LedgerEntry>, MeshError> {
    content
        .split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .map(|(idx, line)| {
            serde_json::from_slice(line).map_err(|source| MeshError::MalformedLedger {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
