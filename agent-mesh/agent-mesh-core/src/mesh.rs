//! The composite operations agents call: each pairs a memory or shadow
//! operation with the matching ledger entry.

use std::sync::Arc;

use tracing::warn;

use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::gateway::StorageGateway;
use crate::ledger::{Ledger, LedgerEntry, Provenance};
use crate::memory::{MemoryRead, MemoryRecord, MemoryStore, MemoryWrite, Revision};
use crate::shadow::{CommitOutcome, ShadowState, ShadowWorkspace};

pub const ACTION_HAND_OFF: &str = "hand_off";
pub const ACTION_CREATE_SHADOW: &str = "create_shadow";
pub const ACTION_COMMIT_SHADOW: &str = "commit_shadow";

pub struct Mesh {
    pub memory: MemoryStore,
    pub ledger: Ledger,
    pub shadow: ShadowWorkspace,
}

impl Mesh {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &MeshConfig) -> Self {
        Self {
            memory: MemoryStore::new(gateway.clone(), config),
            ledger: Ledger::new(gateway.clone(), config),
            shadow: ShadowWorkspace::new(gateway, config),
        }
    }

    pub async fn read_memory(&self, folder_id: &str) -> MemoryRead {
        self.memory.read(folder_id).await
    }

    pub async fn write_memory(&self, folder_id: &str, record: &MemoryRecord) -> MemoryWrite {
        self.memory.write(folder_id, record).await
    }

    pub async fn write_memory_if(
        &self,
        folder_id: &str,
        record: &MemoryRecord,
        expected: Option<&Revision>,
    ) -> MemoryWrite {
        self.memory.write_if(folder_id, record, expected).await
    }

    pub async fn log_action(
        &self,
        folder_id: &str,
        action: &str,
        provenance: Provenance,
    ) -> Result<LedgerEntry, MeshError> {
        self.ledger.log(folder_id, action, provenance).await
    }

    pub async fn history(&self, folder_id: &str) -> Result<Vec<LedgerEntry>, MeshError> {
        self.ledger.entries(folder_id).await
    }

    /// Store `task` as the folder's memory for the next agent and record the
    /// handoff. The memory write stays lenient; the audit entry does not.
    pub async fn hand_off(
        &self,
        folder_id: &str,
        task: &MemoryRecord,
    ) -> Result<MemoryWrite, MeshError> {
        let written = self.memory.write(folder_id, task).await;
        self.ledger
            .log(folder_id, ACTION_HAND_OFF, Provenance::reasoning("Agent handoff"))
            .await?;
        Ok(written)
    }

    pub async fn stage(
        &self,
        folder_id: &str,
        file_ids: Option<&[String]>,
    ) -> Result<String, MeshError> {
        let shadow_id = self.shadow.create(folder_id, file_ids).await?;
        self.ledger
            .log(
                folder_id,
                ACTION_CREATE_SHADOW,
                Provenance::reasoning("Shadow staging created"),
            )
            .await?;
        Ok(shadow_id)
    }

    pub async fn shadow_state(&self, folder_id: &str) -> Result<ShadowState, MeshError> {
        self.shadow.state(folder_id).await
    }

    /// Commit the shadow; only a commit that actually happened is audited.
    /// If the audit entry cannot be written after a successful merge the error
    /// is [`MeshError::CommitUnaudited`], carrying what was merged.
    pub async fn commit(
        &self,
        folder_id: &str,
        approval: bool,
    ) -> Result<CommitOutcome, MeshError> {
        let outcome = self.shadow.commit(folder_id, approval).await?;
        if let CommitOutcome::Committed(report) = &outcome {
            if let Err(err) = self
                .ledger
                .log(
                    folder_id,
                    ACTION_COMMIT_SHADOW,
                    Provenance::reasoning("Shadow changes committed"),
                )
                .await
            {
                warn!(folder_id, error = %err, "commit applied but not audited");
                return Err(MeshError::CommitUnaudited {
                    report: report.clone(),
                    source: Box::new(err),
                });
            }
        }
        Ok(outcome)
    }
}
