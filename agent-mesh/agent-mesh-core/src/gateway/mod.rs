//! Boundary to the hosted file-storage provider.
//!
//! The provider is the engine: every mesh operation is a short, sequential
//! pipeline of the calls below. Nothing here is transactional across calls.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub mod box_api;
pub mod memory;

pub use box_api::BoxGateway;
pub use memory::{Call, InMemoryGateway};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
    /// Anything else a provider may list (web links and the like).
    #[serde(other)]
    Other,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Folder => "folder",
            ItemKind::Other => "other",
        }
    }
}

/// One entry of a folder listing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
}

impl Item {
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Every item directly inside `folder_id`.
    async fn list_items(&self, folder_id: &str) -> Result<Vec<Item>, ProviderError>;
    async fn read_file_content(&self, file_id: &str) -> Result<Bytes, ProviderError>;
    /// Create a new file named `name` inside `folder_id`.
    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        content: Bytes,
    ) -> Result<Item, ProviderError>;
    /// Replace the content of an existing file, keeping its id.
    async fn update_file(&self, file_id: &str, content: Bytes) -> Result<Item, ProviderError>;
    /// Delete a file, or a folder together with everything under it.
    async fn delete_item(&self, kind: ItemKind, item_id: &str) -> Result<(), ProviderError>;
    async fn copy_item(
        &self,
        kind: ItemKind,
        item_id: &str,
        destination_folder_id: &str,
    ) -> Result<Item, ProviderError>;
    async fn create_subfolder(&self, folder_id: &str, name: &str) -> Result<Item, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_decode_as_other() {
        let item: Item =
            serde_json::from_str(r#"{"id":"9","name":"link","type":"web_link"}"#).unwrap();
        assert_eq!(item.kind, ItemKind::Other);
        assert!(!item.is_file() && !item.is_folder());

        let item: Item = serde_json::from_str(r#"{"id":"1","name":"a","type":"file"}"#).unwrap();
        assert!(item.is_file());
    }
}
