//! Remote entity records: tags, variables, and multi-section templates.
//!
//! Tags and variables share one wire shape (`CodeItem`): an ordered parameter
//! list in which exactly one key-typed parameter carries the editable code
//! body (`html` for tags, `javascript` for variables). Templates carry a
//! single marker-delimited document string (see [`crate::template`]).

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Discriminates what kind of entity a tree file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Tag,
    Variable,
    TemplateSection,
}

/// The three entity folders materialized under every loaded workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FolderKind {
    Tags,
    Variables,
    Templates,
}

impl FolderKind {
    /// Directory name under the workspace root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            FolderKind::Tags => "tags",
            FolderKind::Variables => "variables",
            FolderKind::Templates => "templates",
        }
    }

    /// Parameter key holding the editable code body, or `None` for templates
    /// (their body is the whole document, not a parameter).
    pub fn code_key(&self) -> Option<&'static str> {
        match self {
            FolderKind::Tags => Some("html"),
            FolderKind::Variables => Some("javascript"),
            FolderKind::Templates => None,
        }
    }

    /// The kind of file this folder contains.
    pub fn item_kind(&self) -> ItemKind {
        match self {
            FolderKind::Tags => ItemKind::Tag,
            FolderKind::Variables => ItemKind::Variable,
            FolderKind::Templates => ItemKind::TemplateSection,
        }
    }

    /// Parse a workspace subdirectory name back into a folder kind.
    pub fn from_dir_name(name: &str) -> Option<FolderKind> {
        match name {
            "tags" => Some(FolderKind::Tags),
            "variables" => Some(FolderKind::Variables),
            "templates" => Some(FolderKind::Templates),
            _ => None,
        }
    }
}

/// One key-typed parameter of a tag or variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub param_type: String,
    pub key: String,
    pub value: String,
}

/// A tag or variable as served by the remote tag-management API.
///
/// `path` is the server-relative path used for update/delete calls and
/// `fingerprint` is the server's version token; both are passed back
/// verbatim on writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub parameter: Vec<Parameter>,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub path: String,
}

impl CodeItem {
    /// The code body stored under `key`, if the parameter exists.
    pub fn code(&self, key: &str) -> Option<&str> {
        self.parameter
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Return a copy with the code-bearing parameter's value replaced.
    ///
    /// All other parameters are passed through untouched. If no parameter
    /// with `key` exists the item is returned unchanged; that is deliberate
    /// leniency toward partially-formed entities, so it logs instead of
    /// failing.
    pub fn with_code(&self, key: &str, new_code: &str) -> CodeItem {
        let mut item = self.clone();
        match item.parameter.iter_mut().find(|p| p.key == key) {
            Some(param) => param.value = new_code.to_string(),
            None => {
                warn!(
                    item = %self.name,
                    key,
                    "no code-bearing parameter on entity, leaving it unchanged"
                );
            }
        }
        item
    }
}

/// A custom template as served by the remote API: one opaque multi-section
/// document subdivided by uppercase markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "templateData")]
    pub template_data: String,
}

/// Back-reference from a tree file to its owning entity, as last known from
/// the server. This is the canonical state that local buffers are diffed
/// against.
#[derive(Debug, Clone)]
pub enum EntityRef {
    Item(CodeItem),
    Template(Template),
}

impl EntityRef {
    /// Display name of the owning entity.
    pub fn name(&self) -> &str {
        match self {
            EntityRef::Item(item) => &item.name,
            EntityRef::Template(tpl) => &tpl.name,
        }
    }

    /// Server-relative path used for update/delete calls.
    pub fn path(&self) -> &str {
        match self {
            EntityRef::Item(item) => &item.path,
            EntityRef::Template(tpl) => &tpl.path,
        }
    }
}
