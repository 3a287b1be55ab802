//! Process-local provider with Box-like semantics, used by tests and dry runs.
//!
//! Sibling names are unique per kind: uploads, copies and folder creation
//! that would collide fail with a 409 conflict, as the hosted provider does.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Item, ItemKind, StorageGateway};
use crate::error::ProviderError;

pub const ROOT_FOLDER_ID: &str = "0";

/// The gateway operation a call went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    List,
    Read,
    Upload,
    Update,
    Delete,
    Copy,
    CreateFolder,
}

struct Node {
    name: String,
    kind: ItemKind,
    parent: Option<String>,
    content: Bytes,
    seq: u64,
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, Node>,
    next_seq: u64,
    calls: Vec<Call>,
    faults: Vec<(Call, String)>,
}

impl State {
    fn insert(&mut self, parent: Option<&str>, name: &str, kind: ItemKind, content: Bytes) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.insert_with_id(id.clone(), parent, name, kind, content);
        id
    }

    fn insert_with_id(
        &mut self,
        id: String,
        parent: Option<&str>,
        name: &str,
        kind: ItemKind,
        content: Bytes,
    ) {
        self.next_seq += 1;
        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                kind,
                parent: parent.map(str::to_string),
                content,
                seq: self.next_seq,
            },
        );
    }

    fn item(&self, id: &str) -> Option<Item> {
        self.nodes.get(id).map(|node| Item {
            id: id.to_string(),
            name: node.name.clone(),
            kind: node.kind,
        })
    }

    fn children(&self, folder_id: &str) -> Vec<Item> {
        let mut children: Vec<(&String, &Node)> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.as_deref() == Some(folder_id))
            .collect();
        children.sort_by_key(|(_, node)| node.seq);
        children
            .into_iter()
            .map(|(id, node)| Item {
                id: id.clone(),
                name: node.name.clone(),
                kind: node.kind,
            })
            .collect()
    }

    fn folder(&self, id: &str) -> Result<&Node, ProviderError> {
        match self.nodes.get(id) {
            Some(node) if node.kind == ItemKind::Folder => Ok(node),
            _ => Err(ProviderError::not_found(&format!("folder {id}"))),
        }
    }

    fn node(&self, kind: ItemKind, id: &str) -> Result<&Node, ProviderError> {
        match self.nodes.get(id) {
            Some(node) if node.kind == kind => Ok(node),
            _ => Err(ProviderError::not_found(&format!("{} {id}", kind.as_str()))),
        }
    }

    fn ensure_free(&self, folder_id: &str, name: &str, kind: ItemKind) -> Result<(), ProviderError> {
        let taken = self.nodes.values().any(|node| {
            node.parent.as_deref() == Some(folder_id) && node.kind == kind && node.name == name
        });
        if taken {
            Err(ProviderError::conflict(name))
        } else {
            Ok(())
        }
    }

    /// Records the call and fires a matching one-shot fault, if any.
    fn enter(&mut self, call: Call, subject: &str) -> Result<(), ProviderError> {
        self.calls.push(call);
        if let Some(pos) = self
            .faults
            .iter()
            .position(|(c, name)| *c == call && name == subject)
        {
            self.faults.remove(pos);
            return Err(ProviderError::new(
                503,
                "injected_fault",
                format!("injected {call:?} failure for {subject:?}"),
            ));
        }
        Ok(())
    }

    /// Whether `id` is `ancestor_id` or lies somewhere below it.
    fn is_within(&self, id: &str, ancestor_id: &str) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor_id {
                return true;
            }
            current = self.nodes.get(cur).and_then(|node| node.parent.as_deref());
        }
        false
    }

    fn copy_tree(&mut self, source_id: &str, destination_id: &str) -> String {
        let (name, kind, content) = {
            let node = &self.nodes[source_id];
            (node.name.clone(), node.kind, node.content.clone())
        };
        let copy_id = self.insert(Some(destination_id), &name, kind, content);
        if kind == ItemKind::Folder {
            for child in self.children(source_id) {
                self.copy_tree(&child.id, &copy_id);
            }
        }
        copy_id
    }

    fn remove_tree(&mut self, id: &str) {
        for child in self.children(id) {
            self.remove_tree(&child.id);
        }
        self.nodes.remove(id);
    }
}

/// In-memory [`StorageGateway`]. Starts with a single root folder,
/// [`ROOT_FOLDER_ID`].
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let mut state = State::default();
        state.insert_with_id(
            ROOT_FOLDER_ID.to_string(),
            None,
            "All Files",
            ItemKind::Folder,
            Bytes::new(),
        );
        Self {
            state: Mutex::new(state),
        }
    }

    /// Seed a folder without recording a gateway call.
    pub fn add_folder(&self, parent_id: &str, name: &str) -> String {
        self.state
            .lock()
            .insert(Some(parent_id), name, ItemKind::Folder, Bytes::new())
    }

    /// Seed a file without recording a gateway call.
    pub fn add_file(&self, parent_id: &str, name: &str, content: impl Into<Bytes>) -> String {
        self.state
            .lock()
            .insert(Some(parent_id), name, ItemKind::File, content.into())
    }

    pub fn children(&self, folder_id: &str) -> Vec<Item> {
        self.state.lock().children(folder_id)
    }

    pub fn child(&self, folder_id: &str, name: &str, kind: ItemKind) -> Option<Item> {
        self.children(folder_id)
            .into_iter()
            .find(|item| item.name == name && item.kind == kind)
    }

    pub fn content(&self, file_id: &str) -> Option<Bytes> {
        self.state.lock().nodes.get(file_id).map(|n| n.content.clone())
    }

    /// Content of the file `name` directly inside `folder_id`.
    pub fn file_content(&self, folder_id: &str, name: &str) -> Option<Bytes> {
        let item = self.child(folder_id, name, ItemKind::File)?;
        self.content(&item.id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next `call` whose subject is named `name` fail with a 503.
    /// The subject is the listed folder, the read/updated/deleted/copied
    /// item, or the name being uploaded or created.
    pub fn fail_next(&self, call: Call, name: &str) {
        self.state.lock().faults.push((call, name.to_string()));
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn list_items(&self, folder_id: &str) -> Result<Vec<Item>, ProviderError> {
        let mut state = self.state.lock();
        let name = state.folder(folder_id)?.name.clone();
        state.enter(Call::List, &name)?;
        Ok(state.children(folder_id))
    }

    async fn read_file_content(&self, file_id: &str) -> Result<Bytes, ProviderError> {
        let mut state = self.state.lock();
        let name = state.node(ItemKind::File, file_id)?.name.clone();
        state.enter(Call::Read, &name)?;
        Ok(state.nodes[file_id].content.clone())
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        content: Bytes,
    ) -> Result<Item, ProviderError> {
        let mut state = self.state.lock();
        state.folder(folder_id)?;
        state.enter(Call::Upload, name)?;
        state.ensure_free(folder_id, name, ItemKind::File)?;
        let id = state.insert(Some(folder_id), name, ItemKind::File, content);
        Ok(Item {
            id,
            name: name.to_string(),
            kind: ItemKind::File,
        })
    }

    async fn update_file(&self, file_id: &str, content: Bytes) -> Result<Item, ProviderError> {
        let mut state = self.state.lock();
        let name = state.node(ItemKind::File, file_id)?.name.clone();
        state.enter(Call::Update, &name)?;
        if let Some(node) = state.nodes.get_mut(file_id) {
            node.content = content;
        }
        state
            .item(file_id)
            .ok_or_else(|| ProviderError::not_found(&format!("file {file_id}")))
    }

    async fn delete_item(&self, kind: ItemKind, item_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        let name = state.node(kind, item_id)?.name.clone();
        state.enter(Call::Delete, &name)?;
        state.remove_tree(item_id);
        Ok(())
    }

    async fn copy_item(
        &self,
        kind: ItemKind,
        item_id: &str,
        destination_folder_id: &str,
    ) -> Result<Item, ProviderError> {
        let mut state = self.state.lock();
        let name = state.node(kind, item_id)?.name.clone();
        state.folder(destination_folder_id)?;
        state.enter(Call::Copy, &name)?;
        if kind == ItemKind::Folder && state.is_within(destination_folder_id, item_id) {
            return Err(ProviderError::new(
                400,
                "bad_request",
                format!("cannot copy folder {name:?} into itself"),
            ));
        }
        state.ensure_free(destination_folder_id, &name, kind)?;
        let id = state.copy_tree(item_id, destination_folder_id);
        Ok(Item { id, name, kind })
    }

    async fn create_subfolder(&self, folder_id: &str, name: &str) -> Result<Item, ProviderError> {
        let mut state = self.state.lock();
        state.folder(folder_id)?;
        state.enter(Call::CreateFolder, name)?;
        state.ensure_free(folder_id, name, ItemKind::Folder)?;
        let id = state.insert(Some(folder_id), name, ItemKind::Folder, Bytes::new());
        Ok(Item {
            id,
            name: name.to_string(),
            kind: ItemKind::Folder,
        })
    }
}
