//! Shadow staging: tentative edits live in a `[SHADOW]` subfolder of the
//! production folder until an approved commit merges them back.
//!
//! A commit is not transactional. Each staged file is merged and then removed
//! from the shadow folder, so whatever is left in the shadow after a failure
//! is exactly what a repeated commit still has to merge.
//!
//! The mesh's own bookkeeping files (memory and ledger) are never staged by a
//! full scan nor merged back, so a commit cannot roll them back to the copies
//! taken at staging time. A bookkeeping copy that ends up in the shadow anyway
//! is listed as skipped in the commit report.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::{MeshError, ProviderError};
use crate::gateway::{Item, ItemKind, StorageGateway};
use crate::lookup::{find_child, locate, locate_or_create_folder};

#[cfg(test)]
mod tests;

/// Why a commit deliberately did nothing.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Declined {
    ApprovalRequired,
    NoShadow,
}

impl Declined {
    pub fn message(&self) -> &'static str {
        match self {
            Declined::ApprovalRequired => "approval required for commit",
            Declined::NoShadow => "no shadow folder found",
        }
    }
}

/// Names of the staged files merged by a commit, by merge path.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct CommitReport {
    /// Production files whose content was replaced.
    pub replaced: Vec<String>,
    /// Staged files copied in as new production files.
    pub added: Vec<String>,
    /// Staged copies of the memory or ledger file, discarded with the shadow
    /// folder instead of being merged.
    pub skipped: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitReport),
    Declined(Declined),
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// Nothing in production was changed.
    #[error("commit failed: {0}")]
    Failed(#[source] ProviderError),
    /// Production was already modified when the failure hit. `pending` lists
    /// the files still sitting in the shadow folder.
    #[error("commit partially applied ({} merged, {} still staged): {source}", .merged.len(), .pending.len())]
    Partial {
        merged: Vec<String>,
        pending: Vec<String>,
        #[source]
        source: ProviderError,
    },
}

/// Whether a production folder currently has staged work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShadowState {
    NoShadow,
    Staged { shadow_id: String, files: Vec<Item> },
}

enum Merge {
    Replaced,
    Added,
}

pub struct ShadowWorkspace {
    gateway: Arc<dyn StorageGateway>,
    folder_name: String,
    reserved: [String; 2],
}

impl ShadowWorkspace {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &MeshConfig) -> Self {
        Self {
            gateway,
            folder_name: config.names.shadow.clone(),
            reserved: [config.names.memory.clone(), config.names.ledger.clone()],
        }
    }

    /// Stage files of `folder_id` into its shadow folder and return the
    /// shadow folder id.
    ///
    /// With a non-empty `file_ids` only those files are copied; otherwise
    /// every file directly in the production folder is. Nested folders are
    /// never staged. An existing shadow folder is reused, and files already
    /// staged are not skipped: the provider decides what a same-named copy
    /// does.
    pub async fn create(
        &self,
        folder_id: &str,
        file_ids: Option<&[String]>,
    ) -> Result<String, MeshError> {
        let (shadow, created) =
            locate_or_create_folder(&*self.gateway, folder_id, &self.folder_name).await?;
        if created {
            info!(folder_id, shadow_id = %shadow.id, "shadow folder created");
        } else {
            debug!(folder_id, shadow_id = %shadow.id, "reusing shadow folder");
        }

        let mut staged = 0usize;
        match file_ids {
            Some(ids) if !ids.is_empty() => {
                for id in ids {
                    self.gateway
                        .copy_item(ItemKind::File, id, &shadow.id)
                        .await?;
                    staged += 1;
                }
            }
            _ => {
                let items = self.gateway.list_items(folder_id).await?;
                for item in items.iter().filter(|i| self.is_stageable(i)) {
                    self.gateway
                        .copy_item(ItemKind::File, &item.id, &shadow.id)
                        .await?;
                    staged += 1;
                }
            }
        }
        info!(folder_id, staged, "files staged");
        Ok(shadow.id)
    }

    pub async fn state(&self, folder_id: &str) -> Result<ShadowState, MeshError> {
        let Some(shadow) =
            locate(&*self.gateway, folder_id, &self.folder_name, ItemKind::Folder).await?
        else {
            return Ok(ShadowState::NoShadow);
        };
        let files = self
            .gateway
            .list_items(&shadow.id)
            .await?
            .into_iter()
            .filter(Item::is_file)
            .collect();
        Ok(ShadowState::Staged {
            shadow_id: shadow.id,
            files,
        })
    }

    /// Merge the shadow folder back into production and remove it.
    ///
    /// Without `approval` this makes no provider calls at all. A staged file
    /// that has a production counterpart replaces it by delete and re-upload;
    /// one without is copied over. Either way the staged copy is then deleted
    /// from the shadow, and the shadow folder itself goes last.
    pub async fn commit(
        &self,
        folder_id: &str,
        approval: bool,
    ) -> Result<CommitOutcome, CommitError> {
        if !approval {
            debug!(folder_id, "commit declined without approval");
            return Ok(CommitOutcome::Declined(Declined::ApprovalRequired));
        }

        let production = self
            .gateway
            .list_items(folder_id)
            .await
            .map_err(CommitError::Failed)?;
        let Some(shadow) = find_child(&production, &self.folder_name, ItemKind::Folder).cloned()
        else {
            debug!(folder_id, "nothing to commit");
            return Ok(CommitOutcome::Declined(Declined::NoShadow));
        };
        let mut report = CommitReport::default();
        let mut staged: Vec<Item> = Vec::new();
        for item in self
            .gateway
            .list_items(&shadow.id)
            .await
            .map_err(CommitError::Failed)?
        {
            if self.is_stageable(&item) {
                staged.push(item);
            } else if item.is_file() {
                warn!(folder_id, name = %item.name, "discarding staged bookkeeping file");
                report.skipped.push(item.name);
            }
        }

        let mut merged: Vec<String> = Vec::new();
        let mut touched = false;

        for (idx, file) in staged.iter().enumerate() {
            let step = match self
                .merge_file(folder_id, &production, file, &mut touched)
                .await
            {
                Ok(step) => step,
                Err(source) => {
                    return Err(Self::failure(merged, &staged[idx..], touched, source));
                }
            };
            merged.push(file.name.clone());
            match step {
                Merge::Replaced => report.replaced.push(file.name.clone()),
                Merge::Added => report.added.push(file.name.clone()),
            }
            if let Err(source) = self.gateway.delete_item(ItemKind::File, &file.id).await {
                return Err(Self::failure(merged, &staged[idx..], touched, source));
            }
        }

        if let Err(source) = self
            .gateway
            .delete_item(ItemKind::Folder, &shadow.id)
            .await
        {
            return Err(Self::failure(merged, &[], touched, source));
        }

        info!(
            folder_id,
            replaced = report.replaced.len(),
            added = report.added.len(),
            skipped = report.skipped.len(),
            "shadow committed"
        );
        Ok(CommitOutcome::Committed(report))
    }

    fn is_stageable(&self, item: &Item) -> bool {
        item.is_file() && !self.reserved.contains(&item.name)
    }

    async fn merge_file(
        &self,
        folder_id: &str,
        production: &[Item],
        file: &Item,
        touched: &mut bool,
    ) -> Result<Merge, ProviderError> {
        match find_child(production, &file.name, ItemKind::File) {
            Some(target) => {
                let content = self.gateway.read_file_content(&file.id).await?;
                self.gateway.delete_item(ItemKind::File, &target.id).await?;
                *touched = true;
                self.gateway
                    .upload_file(folder_id, &file.name, content)
                    .await?;
                debug!(folder_id, name = %file.name, "replaced production file");
                Ok(Merge::Replaced)
            }
            None => {
                self.gateway
                    .copy_item(ItemKind::File, &file.id, folder_id)
                    .await?;
                *touched = true;
                debug!(folder_id, name = %file.name, "added production file");
                Ok(Merge::Added)
            }
        }
    }

    fn failure(
        merged: Vec<String>,
        still_staged: &[Item],
        touched: bool,
        source: ProviderError,
    ) -> CommitError {
        if !touched {
            return CommitError::Failed(source);
        }
        CommitError::Partial {
            merged,
            pending: still_staged.iter().map(|i| i.name.clone()).collect(),
            source,
        }
    }
}
