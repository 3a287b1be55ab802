//! Name-based lookup of the well-known children of a folder.
//!
//! The mesh never stores item ids between calls; the memory file, the ledger
//! and the shadow folder are re-resolved by (folder, name, kind) every time.
//! The first listed match wins.

use crate::error::ProviderError;
use crate::gateway::{Item, ItemKind, StorageGateway};

pub fn find_child<'a>(items: &'a [Item], name: &str, kind: ItemKind) -> Option<&'a Item> {
    items
        .iter()
        .find(|item| item.kind == kind && item.name == name)
}

/// List `folder_id` and return its child named `name` of the given kind.
pub async fn locate(
    gateway: &dyn StorageGateway,
    folder_id: &str,
    name: &str,
    kind: ItemKind,
) -> Result<Option<Item>, ProviderError> {
    let items = gateway.list_items(folder_id).await?;
    Ok(find_child(&items, name, kind).cloned())
}

/// Return the subfolder `name` of `folder_id`, creating it when missing.
/// The second value is true when the folder was created by this call.
pub async fn locate_or_create_folder(
    gateway: &dyn StorageGateway,
    folder_id: &str,
    name: &str,
) -> Result<(Item, bool), ProviderError> {
    match locate(gateway, folder_id, name, ItemKind::Folder).await? {
        Some(existing) => Ok((existing, false)),
        None => Ok((gateway.create_subfolder(folder_id, name).await?, true)),
    }
}
