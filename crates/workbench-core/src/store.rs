//! The workbench store: single source of truth for what the editor can see.
//!
//! One [`Workbench`] is constructed per editor session. It owns the virtual
//! tree, the loaded-unit registry, the pending-change tracker, and the
//! remote API collaborator. All mutation happens synchronously between
//! suspension points, so no locking is needed inside the store itself.
//!
//! The editor shell consumes two surfaces:
//! - a generic filesystem contract (`stat`/`read`/`write`/`list`) where
//!   structural mutation is rejected, and
//! - dedicated entity operations (create/rename/delete/discard/push) that
//!   know about the remote service.

use crate::api::{Account, Container, TagManagerApi, Workspace};
use crate::changes::{canonical_content, ChangeSet, ModifiedFile, PendingChange};
use crate::config::WorkbenchConfig;
use crate::entity::{CodeItem, EntityRef, FolderKind, ItemKind, Parameter, Template};
use crate::events::{EventBus, WorkbenchEvent};
use crate::template::{parse_sections, section_file_name};
use crate::tree::{
    sanitize_file_name, sanitize_segment, split_address, split_parent, Directory, FileKind,
    FileNode, FileStat, FsError, Node,
};

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Api(#[from] crate::api::ApiError),

    #[error("workspace already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("workspace not loaded: {0}")]
    UnitNotLoaded(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A loaded (container, workspace) pair and where it lives, both remotely
/// and in the tree.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    /// Composite key: the two display names concatenated.
    pub key: String,
    pub container_name: String,
    pub container_public_id: String,
    pub workspace_name: String,
    /// Server-relative path used for entity listings and creates.
    pub workspace_path: String,
    /// Tree directory names (sanitized display names).
    pub container_dir: String,
    pub workspace_dir: String,
}

impl UnitInfo {
    /// Address of the unit's root directory.
    pub fn root_address(&self) -> String {
        format!("{}/{}", self.container_dir, self.workspace_dir)
    }
}

/// In-memory store of loaded workspaces, exposed to the editor as a virtual
/// filesystem.
pub struct Workbench<A: TagManagerApi> {
    pub(crate) root: Directory,
    pub(crate) units: HashMap<String, UnitInfo>,
    pub(crate) changes: ChangeSet,
    pub(crate) api: A,
    pub(crate) config: WorkbenchConfig,
    pub(crate) events: Arc<EventBus>,
}

impl<A: TagManagerApi> Workbench<A> {
    pub fn new(api: A, config: WorkbenchConfig) -> Self {
        Self {
            root: Directory::new(),
            units: HashMap::new(),
            changes: ChangeSet::new(),
            api,
            config,
            events: Arc::new(EventBus::new()),
        }
    }

    /// The event bus; subscribe here for tree and modification updates.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Composite key identifying a loaded (container, workspace) pair.
    pub fn unit_key(container_name: &str, workspace_name: &str) -> String {
        format!("{container_name}{workspace_name}")
    }

    /// Whether a unit is currently loaded.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.units.contains_key(key)
    }

    /// Keys of all loaded units.
    pub fn loaded_units(&self) -> Vec<&UnitInfo> {
        self.units.values().collect()
    }

    // ========== Remote browsing (picker support) ==========

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.api.list_accounts().await?)
    }

    /// Containers of an account, filtered to usage contexts the editor
    /// supports.
    pub async fn supported_containers(&self, account_path: &str) -> Result<Vec<Container>> {
        let containers = self.api.list_containers(account_path).await?;
        Ok(containers
            .into_iter()
            .filter(|c| self.config.supports_usage_context(&c.usage_context))
            .collect())
    }

    pub async fn workspaces(&self, container_path: &str) -> Result<Vec<Workspace>> {
        Ok(self.api.list_workspaces(container_path).await?)
    }

    pub async fn create_workspace(&self, container_path: &str, name: &str) -> Result<Workspace> {
        Ok(self.api.create_workspace(container_path, name).await?)
    }

    // ========== Unit lifecycle ==========

    /// Load a workspace into the tree.
    ///
    /// Rejects a (container, workspace) pair that is already loaded, before
    /// touching anything. Entities whose code cannot be extracted and
    /// templates with no parsed sections are skipped.
    pub async fn load_unit(
        &mut self,
        container_name: &str,
        container_public_id: &str,
        workspace_path: &str,
        workspace_name: &str,
    ) -> Result<String> {
        let key = Self::unit_key(container_name, workspace_name);
        if self.units.contains_key(&key) {
            return Err(StoreError::AlreadyLoaded(key));
        }

        let tags = self.api.list_tags(workspace_path).await?;
        let variables = self.api.list_variables(workspace_path).await?;
        let templates = self.api.list_templates(workspace_path).await?;

        let mut tags_dir = Directory::new();
        for tag in tags {
            match self.item_file(&tag, FolderKind::Tags) {
                Some((name, node)) => tags_dir.insert(name, node),
                None => debug!(tag = %tag.name, "tag has no code body, skipping"),
            }
        }

        let mut variables_dir = Directory::new();
        for variable in variables {
            match self.item_file(&variable, FolderKind::Variables) {
                Some((name, node)) => variables_dir.insert(name, node),
                None => debug!(variable = %variable.name, "variable has no code body, skipping"),
            }
        }

        let mut templates_dir = Directory::new();
        for template in templates {
            let sections = parse_sections(&template.template_data);
            if sections.is_empty() {
                debug!(template = %template.name, "template has no sections, skipping");
                continue;
            }
            let mut template_dir = Directory::new();
            for section in &sections {
                template_dir.insert(
                    section_file_name(&section.name),
                    Node::File(FileNode::new(
                        section.content.clone().into_bytes(),
                        EntityRef::Template(template.clone()),
                        ItemKind::TemplateSection,
                        Some(section.name.clone()),
                    )),
                );
            }
            templates_dir.insert(sanitize_file_name(&template.name), Node::Dir(template_dir));
        }

        let mut unit_root = Directory::new();
        unit_root.insert(FolderKind::Tags.dir_name(), Node::Dir(tags_dir));
        unit_root.insert(FolderKind::Variables.dir_name(), Node::Dir(variables_dir));
        unit_root.insert(FolderKind::Templates.dir_name(), Node::Dir(templates_dir));

        let unit = UnitInfo {
            key: key.clone(),
            container_name: container_name.to_string(),
            container_public_id: container_public_id.to_string(),
            workspace_name: workspace_name.to_string(),
            workspace_path: workspace_path.to_string(),
            container_dir: sanitize_segment(container_name),
            workspace_dir: sanitize_segment(workspace_name),
        };

        let container_node = self
            .root
            .children
            .entry(unit.container_dir.clone())
            .or_insert_with(|| Node::Dir(Directory::new()));
        let Node::Dir(container_dir) = container_node else {
            unreachable!("root children are container directories");
        };
        container_dir.insert(unit.workspace_dir.clone(), Node::Dir(unit_root));

        info!(key = %key, workspace = %workspace_name, "workspace loaded");
        self.units.insert(key.clone(), unit);
        self.events.emit(WorkbenchEvent::UnitLoaded { key: key.clone() });
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(key.clone()),
        });
        Ok(key)
    }

    /// Remove a unit's subtree and cached state. Never contacts the remote
    /// service.
    pub fn unload_unit(&mut self, key: &str) -> Result<()> {
        let unit = self
            .units
            .remove(key)
            .ok_or_else(|| StoreError::UnitNotLoaded(key.to_string()))?;

        if let Some(Node::Dir(container)) = self.root.children.get_mut(&unit.container_dir) {
            container.remove(&unit.workspace_dir);
            if container.children.is_empty() {
                self.root.remove(&unit.container_dir);
            }
        }

        let dropped = self.changes.remove_unit(key);
        if dropped > 0 {
            self.events.emit(WorkbenchEvent::ModificationsChanged {
                pending: self.changes.len(),
            });
        }
        info!(key = %key, dropped_changes = dropped, "workspace unloaded");
        self.events.emit(WorkbenchEvent::UnitUnloaded {
            key: key.to_string(),
        });
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(key.to_string()),
        });
        Ok(())
    }

    fn item_file(&self, item: &CodeItem, folder: FolderKind) -> Option<(String, Node)> {
        let key = folder.code_key()?;
        let code = item.code(key)?;
        let name = format!(
            "{}.{}",
            sanitize_file_name(&item.name),
            self.config.code_extension
        );
        let node = Node::File(FileNode::new(
            code.as_bytes().to_vec(),
            EntityRef::Item(item.clone()),
            folder.item_kind(),
            None,
        ));
        Some((name, node))
    }

    /// Find the unit owning an address (first two segments).
    pub(crate) fn unit_for_address(&self, address: &str) -> Option<&UnitInfo> {
        let segments = split_address(address);
        if segments.len() < 2 {
            return None;
        }
        self.units
            .values()
            .find(|u| u.container_dir == segments[0] && u.workspace_dir == segments[1])
    }

    fn folder_for_address(address: &str) -> Option<FolderKind> {
        let segments = split_address(address);
        segments.get(2).and_then(|s| FolderKind::from_dir_name(s))
    }

    // ========== Generic filesystem contract ==========

    pub fn stat(&self, address: &str) -> std::result::Result<FileStat, FsError> {
        match self.root.lookup(address)? {
            None => Ok(self.root.stat()),
            Some(node) => Ok(node.stat()),
        }
    }

    pub fn read(&self, address: &str) -> std::result::Result<Vec<u8>, FsError> {
        Ok(self.root.file_at(address)?.data.clone())
    }

    pub fn list(&self, address: &str) -> std::result::Result<Vec<(String, FileKind)>, FsError> {
        let dir = self.root.dir_at(address)?;
        let mut entries: Vec<(String, FileKind)> = dir
            .children
            .iter()
            .map(|(name, node)| (name.clone(), node.kind()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Replace a file's buffer and recompute its pending change.
    ///
    /// Writing the canonical content back (with no staged rename) clears the
    /// file from the modified set. The remote service is never touched here.
    pub fn write(&mut self, address: &str, data: &[u8]) -> std::result::Result<(), FsError> {
        let (entity, kind, marker) = {
            let file = self.root.file_at_mut(address)?;
            file.set_data(data.to_vec());
            (file.entity.clone(), file.kind, file.marker.clone())
        };

        let unit_key = self
            .unit_for_address(address)
            .map(|u| u.key.clone())
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let folder = Self::folder_for_address(address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let file_name = split_parent(address)
            .map(|(_, name)| name)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;

        let new_code = String::from_utf8_lossy(data).into_owned();
        let canonical = canonical_content(&entity, folder, marker.as_deref());
        let staged_rename = self.changes.get(address).and_then(|c| c.new_name.clone());

        if new_code == canonical && staged_rename.is_none() {
            if self.changes.remove(address).is_some() {
                self.emit_modifications_changed();
            }
        } else {
            self.changes.upsert(
                address,
                PendingChange {
                    unit_key,
                    folder,
                    file_name,
                    kind,
                    entity,
                    new_code,
                    new_name: staged_rename,
                    marker,
                },
            );
            self.emit_modifications_changed();
        }
        Ok(())
    }

    /// Directory creation is not part of the generic contract.
    pub fn create_directory(&mut self, address: &str) -> std::result::Result<(), FsError> {
        Err(FsError::NoPermission(address.to_string()))
    }

    /// Generic delete is not part of the generic contract; use
    /// [`delete_entity`](Self::delete_entity).
    pub fn remove(&mut self, address: &str) -> std::result::Result<(), FsError> {
        Err(FsError::NoPermission(address.to_string()))
    }

    /// Generic rename is not part of the generic contract; use
    /// [`rename_entity`](Self::rename_entity).
    pub fn rename(&mut self, from: &str, _to: &str) -> std::result::Result<(), FsError> {
        Err(FsError::NoPermission(from.to_string()))
    }

    // ========== Modified-set queries ==========

    pub fn is_modified(&self, address: &str) -> bool {
        self.changes.contains(address)
    }

    pub fn list_modified(&self) -> Vec<ModifiedFile> {
        let mut out: Vec<ModifiedFile> = self
            .changes
            .iter()
            .map(|(address, change)| ModifiedFile {
                address: address.clone(),
                unit_key: change.unit_key.clone(),
                folder: change.folder,
                file_name: change.file_name.clone(),
                rename_pending: change.new_name.is_some(),
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }

    pub(crate) fn emit_modifications_changed(&self) {
        self.events.emit(WorkbenchEvent::ModificationsChanged {
            pending: self.changes.len(),
        });
    }

    // ========== Entity operations ==========

    /// Stage a rename. The tree node moves immediately; the remote entity is
    /// renamed only when the change is pushed.
    pub fn rename_entity(&mut self, address: &str, new_name: &str) -> Result<String> {
        let (kind, entity) = {
            let file = self.root.file_at(address)?;
            (file.kind, file.entity.clone())
        };
        if kind == ItemKind::TemplateSection {
            return Err(StoreError::Unsupported(
                "template sections are named by their markers".to_string(),
            ));
        }

        let unit_key = self
            .unit_for_address(address)
            .map(|u| u.key.clone())
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let folder = Self::folder_for_address(address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let (parent_address, old_file_name) =
            split_parent(address).ok_or_else(|| FsError::NotFound(address.to_string()))?;

        let new_file_name = format!(
            "{}.{}",
            sanitize_file_name(new_name),
            self.config.code_extension
        );

        let parent = self.root.dir_at_mut(&parent_address)?;
        let node = parent
            .remove(&old_file_name)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        parent.insert(new_file_name.clone(), node);
        let new_address = format!("{parent_address}/{new_file_name}");

        let mut change = self.changes.remove(address).unwrap_or_else(|| {
            let canonical = canonical_content(&entity, folder, None);
            PendingChange {
                unit_key: unit_key.clone(),
                folder,
                file_name: new_file_name.clone(),
                kind,
                entity: entity.clone(),
                new_code: canonical,
                new_name: None,
                marker: None,
            }
        });
        change.file_name = new_file_name.clone();
        change.new_name = Some(new_name.to_string());

        // Renaming back to the entity's own display name is not a pending
        // rename; with an unedited buffer the entry disappears entirely.
        if change.new_name.as_deref() == Some(entity.name()) {
            change.new_name = None;
        }
        let canonical = canonical_content(&entity, folder, None);
        let fully_reverted = change.new_name.is_none() && change.new_code == canonical;
        if !fully_reverted {
            self.changes.upsert(&new_address, change);
        }

        self.emit_modifications_changed();
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(unit_key),
        });
        Ok(new_address)
    }

    /// Delete a tag or variable: remote delete first, then detach the node.
    /// A failing remote call propagates and leaves the tree untouched.
    pub async fn delete_entity(&mut self, address: &str) -> Result<()> {
        let (kind, entity_path) = {
            let file = self.root.file_at(address)?;
            (file.kind, file.entity.path().to_string())
        };
        let folder = Self::folder_for_address(address)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;

        match kind {
            ItemKind::Tag => self.api.delete_tag(&entity_path).await?,
            ItemKind::Variable => self.api.delete_variable(&entity_path).await?,
            ItemKind::TemplateSection => {
                return Err(StoreError::Unsupported(
                    "templates are deleted by unit and name, not by section address".to_string(),
                ));
            }
        }

        debug!(address, folder = ?folder, "entity deleted remotely");
        self.remove_entity_file(address)
    }

    /// Detach a file node after a confirmed remote deletion, dropping any
    /// pending change for it.
    pub fn remove_entity_file(&mut self, address: &str) -> Result<()> {
        let (parent_address, file_name) =
            split_parent(address).ok_or_else(|| FsError::NotFound(address.to_string()))?;
        let parent = self.root.dir_at_mut(&parent_address)?;
        parent
            .remove(&file_name)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;

        if self.changes.remove(address).is_some() {
            self.emit_modifications_changed();
        }
        let unit_key = self.unit_for_address(address).map(|u| u.key.clone());
        self.events.emit(WorkbenchEvent::TreeChanged { unit_key });
        Ok(())
    }

    /// Remove a template's folder (and its pending changes) from the tree.
    /// The consumed remote surface has no template delete, so this is a
    /// local detach only.
    pub fn delete_template(&mut self, unit_key: &str, template_name: &str) -> Result<()> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?;
        let dir_name = sanitize_file_name(template_name);
        let parent_address = format!(
            "{}/{}",
            unit.root_address(),
            FolderKind::Templates.dir_name()
        );
        let template_address = format!("{parent_address}/{dir_name}");

        let parent = self.root.dir_at_mut(&parent_address)?;
        parent
            .remove(&dir_name)
            .ok_or_else(|| FsError::NotFound(template_address.clone()))?;

        let dropped = self.changes.remove_prefix(&format!("{template_address}/"));
        if dropped > 0 {
            self.emit_modifications_changed();
        }
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(unit_key.to_string()),
        });
        Ok(())
    }

    /// Create a tag remotely and materialize its file. The remote call
    /// happens first; a failure leaves the tree unmodified.
    pub async fn create_tag(&mut self, unit_key: &str, name: &str) -> Result<String> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?
            .clone();
        let tag = CodeItem {
            id: String::new(),
            name: name.to_string(),
            item_type: "html".to_string(),
            parameter: vec![Parameter {
                param_type: "template".to_string(),
                key: "html".to_string(),
                value: self.config.default_tag_code.clone(),
            }],
            fingerprint: String::new(),
            path: String::new(),
        };
        let created = self.api.create_tag(&unit.workspace_path, tag).await?;
        let address = self.add_entity_file(unit_key, FolderKind::Tags, &created)?;
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(unit_key.to_string()),
        });
        Ok(address)
    }

    /// Create a variable remotely and materialize its file.
    pub async fn create_variable(&mut self, unit_key: &str, name: &str) -> Result<String> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?
            .clone();
        let variable = CodeItem {
            id: String::new(),
            name: name.to_string(),
            item_type: "jsm".to_string(),
            parameter: vec![Parameter {
                param_type: "template".to_string(),
                key: "javascript".to_string(),
                value: self.config.default_variable_code.clone(),
            }],
            fingerprint: String::new(),
            path: String::new(),
        };
        let created = self
            .api
            .create_variable(&unit.workspace_path, variable)
            .await?;
        let address = self.add_entity_file(unit_key, FolderKind::Variables, &created)?;
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(unit_key.to_string()),
        });
        Ok(address)
    }

    /// Create a template remotely and materialize its section folder.
    pub async fn create_template(
        &mut self,
        unit_key: &str,
        name: &str,
        document: &str,
    ) -> Result<String> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?
            .clone();
        let template = Template {
            id: String::new(),
            name: name.to_string(),
            fingerprint: String::new(),
            path: String::new(),
            template_data: document.to_string(),
        };
        let created = self
            .api
            .create_template(&unit.workspace_path, template)
            .await?;
        let address = self.add_template_folder(unit_key, &created)?;
        self.events.emit(WorkbenchEvent::TreeChanged {
            unit_key: Some(unit_key.to_string()),
        });
        Ok(address)
    }

    /// Materialize an already-created remote tag/variable into the tree.
    pub fn add_entity_file(
        &mut self,
        unit_key: &str,
        folder: FolderKind,
        item: &CodeItem,
    ) -> Result<String> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?;
        let dir_address = format!("{}/{}", unit.root_address(), folder.dir_name());
        let (file_name, node) = self.item_file(item, folder).ok_or_else(|| {
            StoreError::Unsupported(format!("{} carry no code body", folder.dir_name()))
        })?;
        let address = format!("{dir_address}/{file_name}");
        self.root.dir_at_mut(&dir_address)?.insert(file_name, node);
        Ok(address)
    }

    /// Materialize an already-created remote template into the tree.
    pub fn add_template_folder(&mut self, unit_key: &str, template: &Template) -> Result<String> {
        let unit = self
            .units
            .get(unit_key)
            .ok_or_else(|| StoreError::UnitNotLoaded(unit_key.to_string()))?;
        let parent_address = format!(
            "{}/{}",
            unit.root_address(),
            FolderKind::Templates.dir_name()
        );
        let dir_name = sanitize_file_name(&template.name);
        let address = format!("{parent_address}/{dir_name}");

        let mut template_dir = Directory::new();
        for section in parse_sections(&template.template_data) {
            template_dir.insert(
                section_file_name(&section.name),
                Node::File(FileNode::new(
                    section.content.into_bytes(),
                    EntityRef::Template(template.clone()),
                    ItemKind::TemplateSection,
                    Some(section.name),
                )),
            );
        }
        self.root
            .dir_at_mut(&parent_address)?
            .insert(dir_name, Node::Dir(template_dir));
        Ok(address)
    }

    // ========== Discard ==========

    /// Restore one file (or, with `None`, every pending file) to canonical
    /// content, reversing any staged rename. Exactly one modifications
    /// notification fires afterward, however many files were touched.
    pub fn discard(&mut self, address: Option<&str>) -> Result<()> {
        match address {
            Some(address) => self.discard_one(address)?,
            None => {
                for address in self.changes.addresses() {
                    self.discard_one(&address)?;
                }
            }
        }
        self.emit_modifications_changed();
        self.events.emit(WorkbenchEvent::TreeChanged { unit_key: None });
        Ok(())
    }

    fn discard_one(&mut self, address: &str) -> Result<()> {
        let Some(change) = self.changes.remove(address) else {
            return Ok(());
        };
        let canonical = canonical_content(&change.entity, change.folder, change.marker.as_deref());
        let (parent_address, current_name) =
            split_parent(address).ok_or_else(|| FsError::NotFound(address.to_string()))?;

        // The node may have been renamed; move it back to the name derived
        // from the entity's original display name.
        let original_name = match change.kind {
            ItemKind::TemplateSection => current_name.clone(),
            _ => format!(
                "{}.{}",
                sanitize_file_name(change.entity.name()),
                self.config.code_extension
            ),
        };

        let parent = self.root.dir_at_mut(&parent_address)?;
        let mut node = parent
            .remove(&current_name)
            .ok_or_else(|| FsError::NotFound(address.to_string()))?;
        if let Node::File(file) = &mut node {
            file.set_data(canonical.into_bytes());
        }
        parent.insert(original_name, node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;

    const WS: &str = "accounts/1/containers/2/workspaces/3";

    fn item(name: &str, kind: FolderKind, code: &str) -> CodeItem {
        let (item_type, key) = match kind {
            FolderKind::Tags => ("html", "html"),
            FolderKind::Variables => ("jsm", "javascript"),
            FolderKind::Templates => unreachable!(),
        };
        let id = name.to_lowercase().replace(' ', "-");
        CodeItem {
            id: id.clone(),
            name: name.to_string(),
            item_type: item_type.to_string(),
            parameter: vec![Parameter {
                param_type: "template".to_string(),
                key: key.to_string(),
                value: code.to_string(),
            }],
            fingerprint: "1".to_string(),
            path: format!("{WS}/{}/{id}", kind.dir_name()),
        }
    }

    fn template(name: &str, document: &str) -> Template {
        let id = name.to_lowercase().replace(' ', "-");
        Template {
            id: id.clone(),
            name: name.to_string(),
            fingerprint: "1".to_string(),
            path: format!("{WS}/templates/{id}"),
            template_data: document.to_string(),
        }
    }

    async fn loaded_workbench(api: InMemoryApi) -> (Workbench<InMemoryApi>, String) {
        let mut workbench = Workbench::new(api, WorkbenchConfig::default());
        let key = workbench
            .load_unit("My Container", "GTM-ABC", WS, "Default")
            .await
            .unwrap();
        (workbench, key)
    }

    fn seeded_api() -> InMemoryApi {
        let api = InMemoryApi::new();
        api.seed_tag(WS, item("Analytics", FolderKind::Tags, "<script>a()</script>"));
        api.seed_variable(
            WS,
            item("Page Path", FolderKind::Variables, "function() { return document.location.pathname; }"),
        );
        api.seed_template(
            WS,
            template(
                "Consent",
                "___INFO___\n{}\n\n___SANDBOXED_JS_FOR_WEB_TEMPLATE___\nconst x = 1;\n",
            ),
        );
        api
    }

    #[tokio::test]
    async fn load_unit_materializes_the_subtree() {
        let (workbench, _key) = loaded_workbench(seeded_api()).await;

        let listing = workbench.list("My Container/Default").unwrap();
        let names: Vec<&str> = listing.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["tags", "templates", "variables"]);

        let tags = workbench.list("My Container/Default/tags").unwrap();
        assert_eq!(tags[0].0, "Analytics.js");

        let sections = workbench
            .list("My Container/Default/templates/Consent")
            .unwrap();
        let names: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["INFO.json", "SANDBOXED_JS_FOR_WEB_TEMPLATE.js"]);

        let body = workbench
            .read("My Container/Default/variables/Page_Path.js")
            .unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "function() { return document.location.pathname; }"
        );
    }

    #[tokio::test]
    async fn load_unit_twice_is_rejected_without_mutation() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;

        let err = workbench
            .load_unit("My Container", "GTM-ABC", WS, "Default")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyLoaded(_)));

        // existing state untouched
        assert!(workbench.is_loaded(&Workbench::<InMemoryApi>::unit_key(
            "My Container",
            "Default"
        )));
        assert!(workbench.read("My Container/Default/tags/Analytics.js").is_ok());
    }

    #[tokio::test]
    async fn load_unit_omits_entities_without_code_or_sections() {
        let api = seeded_api();
        api.seed_tag(WS, {
            let mut tag = item("Paused", FolderKind::Tags, "");
            tag.parameter.clear();
            tag
        });
        api.seed_template(WS, template("Empty", "no markers in here"));
        let (workbench, _key) = loaded_workbench(api).await;

        let tags = workbench.list("My Container/Default/tags").unwrap();
        assert_eq!(tags.len(), 1);
        let templates = workbench.list("My Container/Default/templates").unwrap();
        assert_eq!(templates.len(), 1);
    }

    #[tokio::test]
    async fn unload_unit_drops_subtree_and_pending_changes() {
        let (mut workbench, key) = loaded_workbench(seeded_api()).await;
        workbench
            .write("My Container/Default/tags/Analytics.js", b"<script>b()</script>")
            .unwrap();
        assert_eq!(workbench.list_modified().len(), 1);

        workbench.unload_unit(&key).unwrap();
        assert!(!workbench.is_loaded(&key));
        assert!(workbench.list_modified().is_empty());
        assert!(matches!(
            workbench.read("My Container/Default/tags/Analytics.js"),
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_tracks_and_reverting_untracks() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/tags/Analytics.js";

        workbench.write(address, b"<script>edited()</script>").unwrap();
        assert!(workbench.is_modified(address));

        // writing the canonical body back clears the entry
        workbench.write(address, b"<script>a()</script>").unwrap();
        assert!(!workbench.is_modified(address));
        assert!(workbench.list_modified().is_empty());
    }

    #[tokio::test]
    async fn template_section_edits_compare_against_last_synced_document() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let js = "My Container/Default/templates/Consent/SANDBOXED_JS_FOR_WEB_TEMPLATE.js";
        let info = "My Container/Default/templates/Consent/INFO.json";

        workbench.write(js, b"const x = 2;").unwrap();
        workbench.write(info, b"{ \"v\": 2 }").unwrap();
        assert_eq!(workbench.list_modified().len(), 2);

        // each section reverts independently against the original document
        workbench.write(js, b"const x = 1;").unwrap();
        assert!(!workbench.is_modified(js));
        assert!(workbench.is_modified(info));
    }

    #[tokio::test]
    async fn stat_and_kind_mismatch_errors() {
        let (workbench, _key) = loaded_workbench(seeded_api()).await;

        let stat = workbench
            .stat("My Container/Default/tags/Analytics.js")
            .unwrap();
        assert_eq!(stat.kind, FileKind::File);
        assert!(stat.size > 0);

        assert!(matches!(
            workbench.stat("My Container/Default/nope"),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            workbench.read("My Container/Default/tags"),
            Err(FsError::NotAFile(_))
        ));
        assert!(matches!(
            workbench.list("My Container/Default/tags/Analytics.js"),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn addresses_are_percent_decoded() {
        let (workbench, _key) = loaded_workbench(seeded_api()).await;
        let body = workbench
            .read("My%20Container/Default/tags/Analytics.js")
            .unwrap();
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn structural_mutation_through_the_generic_contract_is_rejected() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        assert!(matches!(
            workbench.create_directory("My Container/Default/extra"),
            Err(FsError::NoPermission(_))
        ));
        assert!(matches!(
            workbench.remove("My Container/Default/tags/Analytics.js"),
            Err(FsError::NoPermission(_))
        ));
        assert!(matches!(
            workbench.rename("My Container/Default/tags/Analytics.js", "x"),
            Err(FsError::NoPermission(_))
        ));
    }

    #[tokio::test]
    async fn rename_stages_locally_and_discard_restores_name_and_content() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/tags/Analytics.js";

        workbench.write(address, b"<script>edited()</script>").unwrap();
        let new_address = workbench.rename_entity(address, "Analytics v2").unwrap();
        assert_eq!(new_address, "My Container/Default/tags/Analytics_v2.js");
        assert!(workbench.read(address).is_err());
        assert!(workbench.is_modified(&new_address));

        // rename preserved the staged edit
        let listed = workbench.list_modified();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].rename_pending);

        // one discard restores both name and content
        workbench.discard(Some(new_address.as_str())).unwrap();
        assert!(workbench.list_modified().is_empty());
        let body = workbench.read(address).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "<script>a()</script>");
    }

    #[tokio::test]
    async fn rename_back_to_original_clears_the_pending_entry() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/tags/Analytics.js";

        let renamed = workbench.rename_entity(address, "Other").unwrap();
        assert!(workbench.is_modified(&renamed));

        let back = workbench.rename_entity(&renamed, "Analytics").unwrap();
        assert_eq!(back, address);
        assert!(workbench.list_modified().is_empty());
    }

    #[tokio::test]
    async fn rename_of_template_sections_is_unsupported() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let err = workbench
            .rename_entity("My Container/Default/templates/Consent/INFO.json", "X")
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[tokio::test]
    async fn discard_all_restores_every_pending_file() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        workbench
            .write("My Container/Default/tags/Analytics.js", b"<script>x</script>")
            .unwrap();
        workbench
            .write(
                "My Container/Default/variables/Page_Path.js",
                b"function() { return 1; }",
            )
            .unwrap();
        assert_eq!(workbench.list_modified().len(), 2);

        workbench.discard(None).unwrap();
        assert!(workbench.list_modified().is_empty());
        let body = workbench
            .read("My Container/Default/tags/Analytics.js")
            .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "<script>a()</script>");
    }

    #[tokio::test]
    async fn delete_entity_calls_remote_then_detaches() {
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;
        let address = "My Container/Default/tags/Analytics.js";

        workbench.delete_entity(address).await.unwrap();
        assert!(workbench.read(address).is_err());
        assert!(workbench.api.list_tags(WS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_entity_remote_failure_leaves_tree_untouched() {
        let api = seeded_api();
        let (mut workbench, _key) = loaded_workbench(api).await;
        let address = "My Container/Default/tags/Analytics.js";

        // the fake only fails injected names; deleting a bogus path errors
        let bogus = workbench.root.file_at_mut(address).unwrap();
        if let EntityRef::Item(item) = &mut bogus.entity {
            item.path = "accounts/1/containers/2/workspaces/3/tags/ghost".to_string();
        }
        let err = workbench.delete_entity(address).await.unwrap_err();
        assert!(matches!(err, StoreError::Api(_)));
        assert!(workbench.read(address).is_ok());
    }

    #[tokio::test]
    async fn delete_template_detaches_folder_and_changes() {
        let (mut workbench, key) = loaded_workbench(seeded_api()).await;
        workbench
            .write(
                "My Container/Default/templates/Consent/INFO.json",
                b"{ \"v\": 9 }",
            )
            .unwrap();

        workbench.delete_template(&key, "Consent").unwrap();
        assert!(workbench
            .list("My Container/Default/templates")
            .unwrap()
            .is_empty());
        assert!(workbench.list_modified().is_empty());
    }

    #[tokio::test]
    async fn create_variable_materializes_sanitized_file() {
        let (mut workbench, key) = loaded_workbench(seeded_api()).await;

        let address = workbench.create_variable(&key, "Test Var").await.unwrap();
        assert_eq!(address, "My Container/Default/variables/Test_Var.js");

        let body = workbench.read(&address).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "function() { return undefined; }"
        );
        // freshly created files are clean
        assert!(!workbench.is_modified(&address));
    }

    #[tokio::test]
    async fn create_template_materializes_section_folder() {
        let (mut workbench, key) = loaded_workbench(seeded_api()).await;
        let address = workbench
            .create_template(&key, "New Template", "___INFO___\n{}\n\n___TESTS___\nok();\n")
            .await
            .unwrap();
        assert_eq!(address, "My Container/Default/templates/New_Template");

        let sections = workbench.list(&address).unwrap();
        let names: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["INFO.json", "TESTS.js"]);
    }

    #[tokio::test]
    async fn supported_containers_filters_by_usage_context() {
        let api = InMemoryApi::new();
        api.add_account(Account {
            account_id: "1".into(),
            name: "Acme".into(),
            path: "accounts/1".into(),
        });
        api.add_container(
            "accounts/1",
            Container {
                container_id: "2".into(),
                name: "Web".into(),
                public_id: "GTM-WEB".into(),
                path: "accounts/1/containers/2".into(),
                usage_context: vec!["web".into()],
            },
        );
        api.add_container(
            "accounts/1",
            Container {
                container_id: "3".into(),
                name: "Mobile".into(),
                public_id: "GTM-APP".into(),
                path: "accounts/1/containers/3".into(),
                usage_context: vec!["ios".into()],
            },
        );
        let workbench = Workbench::new(api, WorkbenchConfig::default());

        let accounts = workbench.accounts().await.unwrap();
        let containers = workbench
            .supported_containers(&accounts[0].path)
            .await
            .unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "Web");
    }

    #[tokio::test]
    async fn modification_events_fire_on_write_and_discard() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let (mut workbench, _key) = loaded_workbench(seeded_api()).await;

        let notified = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&notified);
        let bus = workbench.events();
        let _sub = bus.subscribe(move |event| {
            if matches!(event, WorkbenchEvent::ModificationsChanged { .. }) {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        });

        workbench
            .write("My Container/Default/tags/Analytics.js", b"<script>x</script>")
            .unwrap();
        assert_eq!(notified.load(Ordering::Relaxed), 1);

        // discard-all fires exactly one modifications notification
        workbench
            .write(
                "My Container/Default/variables/Page_Path.js",
                b"function() { return 2; }",
            )
            .unwrap();
        let before = notified.load(Ordering::Relaxed);
        workbench.discard(None).unwrap();
        assert_eq!(notified.load(Ordering::Relaxed), before + 1);
    }
}
