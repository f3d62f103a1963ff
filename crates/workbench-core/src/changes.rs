//! Pending-change tracking: which files are dirty, and what is staged for
//! the next push.
//!
//! A pending change exists for an address exactly when the file's buffer
//! differs from the entity's canonical content, or a rename is staged. The
//! canonical side of the diff is always the entity as last known from the
//! server, never the live tree buffer.

use crate::entity::{EntityRef, FolderKind, ItemKind};
use crate::template::parse_sections;

use serde::Serialize;
use std::collections::HashMap;

/// A staged, unsaved edit and/or rename against one file address.
#[derive(Debug, Clone)]
pub struct PendingChange {
    /// Composite key of the owning container/workspace unit.
    pub unit_key: String,
    pub folder: FolderKind,
    /// File name at the current (possibly renamed) address.
    pub file_name: String,
    pub kind: ItemKind,
    /// The entity as last known from the server.
    pub entity: EntityRef,
    /// The locally edited code body.
    pub new_code: String,
    /// New display name, set only while a rename is staged.
    pub new_name: Option<String>,
    /// Section marker, set only for template sections.
    pub marker: Option<String>,
}

/// Summary of one modified file, for editor-side listings and decorations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub address: String,
    pub unit_key: String,
    pub folder: FolderKind,
    pub file_name: String,
    pub rename_pending: bool,
}

/// Address-keyed set of pending changes.
#[derive(Debug, Default)]
pub struct ChangeSet {
    entries: HashMap<String, PendingChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, address: &str, change: PendingChange) {
        self.entries.insert(address.to_string(), change);
    }

    pub fn remove(&mut self, address: &str) -> Option<PendingChange> {
        self.entries.remove(address)
    }

    pub fn get(&self, address: &str) -> Option<&PendingChange> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Move a pending change to a new address, e.g. after a rename re-keys
    /// the tree node.
    pub fn rekey(&mut self, old_address: &str, new_address: &str) {
        if let Some(change) = self.entries.remove(old_address) {
            self.entries.insert(new_address.to_string(), change);
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PendingChange)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every change belonging to a unit. Returns how many were removed.
    pub fn remove_unit(&mut self, unit_key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| c.unit_key != unit_key);
        before - self.entries.len()
    }

    /// Drop every change whose address starts with `prefix`. Returns how
    /// many were removed.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|addr, _| !addr.starts_with(prefix));
        before - self.entries.len()
    }
}

/// Canonical content for a file, derived from its entity.
///
/// For tags/variables this is the code-bearing parameter's value; for a
/// template section it is that marker's content parsed out of the entity's
/// last-synced document. Missing parameter or marker yields the empty
/// string.
pub(crate) fn canonical_content(
    entity: &EntityRef,
    folder: FolderKind,
    marker: Option<&str>,
) -> String {
    match entity {
        EntityRef::Item(item) => folder
            .code_key()
            .and_then(|key| item.code(key))
            .unwrap_or_default()
            .to_string(),
        EntityRef::Template(tpl) => marker
            .and_then(|m| {
                parse_sections(&tpl.template_data)
                    .into_iter()
                    .find(|s| s.name == m)
            })
            .map(|s| s.content)
            .unwrap_or_default(),
    }
}
