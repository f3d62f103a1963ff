//! Remote tag-management API collaborator.
//!
//! The editor core never talks HTTP itself; it consumes this trait. The real
//! client (authentication, fetch-based CRUD against the REST endpoints) lives
//! with the editor glue. `InMemoryApi` is the in-process stand-in used by the
//! test suite.

use crate::entity::{CodeItem, Template};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed API response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// An account visible to the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub name: String,
    pub path: String,
}

/// A container within an account. `usage_context` gates container kinds the
/// editor does not support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "containerId")]
    pub container_id: String,
    pub name: String,
    #[serde(rename = "publicId")]
    pub public_id: String,
    pub path: String,
    #[serde(rename = "usageContext", default)]
    pub usage_context: Vec<String>,
}

/// A workspace within a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    pub name: String,
    pub path: String,
}

/// The remote operations the editor core consumes.
///
/// Update calls take the full entity record; the server path and fingerprint
/// travel inside it. Every call may suspend on the network and surfaces
/// failures as [`ApiError`] — the store decides per call site whether to
/// aggregate or propagate.
#[async_trait]
pub trait TagManagerApi: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    async fn list_containers(&self, account_path: &str) -> Result<Vec<Container>>;

    async fn list_workspaces(&self, container_path: &str) -> Result<Vec<Workspace>>;

    async fn create_workspace(&self, container_path: &str, name: &str) -> Result<Workspace>;

    async fn list_tags(&self, workspace_path: &str) -> Result<Vec<CodeItem>>;

    async fn create_tag(&self, workspace_path: &str, tag: CodeItem) -> Result<CodeItem>;

    async fn update_tag(&self, tag: &CodeItem) -> Result<CodeItem>;

    async fn delete_tag(&self, path: &str) -> Result<()>;

    async fn list_variables(&self, workspace_path: &str) -> Result<Vec<CodeItem>>;

    async fn create_variable(&self, workspace_path: &str, variable: CodeItem) -> Result<CodeItem>;

    async fn update_variable(&self, variable: &CodeItem) -> Result<CodeItem>;

    async fn delete_variable(&self, path: &str) -> Result<()>;

    async fn list_templates(&self, workspace_path: &str) -> Result<Vec<Template>>;

    async fn create_template(&self, workspace_path: &str, template: Template) -> Result<Template>;

    async fn update_template(&self, template: &Template) -> Result<Template>;
}

#[derive(Default)]
struct ApiState {
    accounts: Vec<Account>,
    containers: HashMap<String, Vec<Container>>,
    workspaces: HashMap<String, Vec<Workspace>>,
    tags: HashMap<String, Vec<CodeItem>>,
    variables: HashMap<String, Vec<CodeItem>>,
    templates: HashMap<String, Vec<Template>>,
    /// Entity names whose write calls fail (for partial-failure tests).
    fail_names: HashSet<String>,
    /// Display names of every update call, in call order.
    update_calls: Vec<String>,
    next_fingerprint: u64,
}

/// In-memory implementation of [`TagManagerApi`] for tests.
///
/// Fingerprints are bumped on every successful write, new entities get random
/// ids, and write failures can be injected per entity name.
pub struct InMemoryApi {
    state: Mutex<ApiState>,
}

impl Default for InMemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ApiState {
                next_fingerprint: 1,
                ..ApiState::default()
            }),
        }
    }

    pub fn add_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.push(account);
    }

    pub fn add_container(&self, account_path: &str, container: Container) {
        self.state
            .lock()
            .unwrap()
            .containers
            .entry(account_path.to_string())
            .or_default()
            .push(container);
    }

    pub fn add_workspace(&self, container_path: &str, workspace: Workspace) {
        self.state
            .lock()
            .unwrap()
            .workspaces
            .entry(container_path.to_string())
            .or_default()
            .push(workspace);
    }

    pub fn seed_tag(&self, workspace_path: &str, tag: CodeItem) {
        self.state
            .lock()
            .unwrap()
            .tags
            .entry(workspace_path.to_string())
            .or_default()
            .push(tag);
    }

    pub fn seed_variable(&self, workspace_path: &str, variable: CodeItem) {
        self.state
            .lock()
            .unwrap()
            .variables
            .entry(workspace_path.to_string())
            .or_default()
            .push(variable);
    }

    pub fn seed_template(&self, workspace_path: &str, template: Template) {
        self.state
            .lock()
            .unwrap()
            .templates
            .entry(workspace_path.to_string())
            .or_default()
            .push(template);
    }

    /// Make every subsequent write call for the named entity fail.
    pub fn fail_on(&self, name: &str) {
        self.state.lock().unwrap().fail_names.insert(name.to_string());
    }

    /// Display names of every update call issued so far, in call order.
    pub fn update_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().update_calls.clone()
    }

    fn next_fingerprint(state: &mut ApiState) -> String {
        let fp = state.next_fingerprint;
        state.next_fingerprint += 1;
        fp.to_string()
    }

    fn check_write(state: &ApiState, name: &str) -> Result<()> {
        if state.fail_names.contains(name) {
            return Err(ApiError::Http {
                status: 500,
                message: format!("injected failure for {name}"),
            });
        }
        Ok(())
    }

    fn update_item(
        slot: &mut HashMap<String, Vec<CodeItem>>,
        item: &CodeItem,
        fingerprint: String,
    ) -> Result<CodeItem> {
        for items in slot.values_mut() {
            if let Some(stored) = items.iter_mut().find(|i| i.path == item.path) {
                *stored = CodeItem {
                    fingerprint,
                    ..item.clone()
                };
                return Ok(stored.clone());
            }
        }
        Err(ApiError::Http {
            status: 404,
            message: format!("no entity at {}", item.path),
        })
    }

    fn delete_item(slot: &mut HashMap<String, Vec<CodeItem>>, path: &str) -> Result<()> {
        for items in slot.values_mut() {
            let before = items.len();
            items.retain(|i| i.path != path);
            if items.len() < before {
                return Ok(());
            }
        }
        Err(ApiError::Http {
            status: 404,
            message: format!("no entity at {path}"),
        })
    }
}

#[async_trait]
impl TagManagerApi for InMemoryApi {
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn list_containers(&self, account_path: &str) -> Result<Vec<Container>> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(account_path).cloned().unwrap_or_default())
    }

    async fn list_workspaces(&self, container_path: &str) -> Result<Vec<Workspace>> {
        let state = self.state.lock().unwrap();
        Ok(state.workspaces.get(container_path).cloned().unwrap_or_default())
    }

    async fn create_workspace(&self, container_path: &str, name: &str) -> Result<Workspace> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, name)?;
        let id = Uuid::new_v4().simple().to_string();
        let workspace = Workspace {
            workspace_id: id.clone(),
            name: name.to_string(),
            path: format!("{container_path}/workspaces/{id}"),
        };
        state
            .workspaces
            .entry(container_path.to_string())
            .or_default()
            .push(workspace.clone());
        Ok(workspace)
    }

    async fn list_tags(&self, workspace_path: &str) -> Result<Vec<CodeItem>> {
        let state = self.state.lock().unwrap();
        Ok(state.tags.get(workspace_path).cloned().unwrap_or_default())
    }

    async fn create_tag(&self, workspace_path: &str, tag: CodeItem) -> Result<CodeItem> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &tag.name)?;
        let id = Uuid::new_v4().simple().to_string();
        let fingerprint = Self::next_fingerprint(&mut state);
        let created = CodeItem {
            id: id.clone(),
            path: format!("{workspace_path}/tags/{id}"),
            fingerprint,
            ..tag
        };
        state
            .tags
            .entry(workspace_path.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_tag(&self, tag: &CodeItem) -> Result<CodeItem> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &tag.name)?;
        state.update_calls.push(tag.name.clone());
        let fingerprint = Self::next_fingerprint(&mut state);
        Self::update_item(&mut state.tags, tag, fingerprint)
    }

    async fn delete_tag(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::delete_item(&mut state.tags, path)
    }

    async fn list_variables(&self, workspace_path: &str) -> Result<Vec<CodeItem>> {
        let state = self.state.lock().unwrap();
        Ok(state.variables.get(workspace_path).cloned().unwrap_or_default())
    }

    async fn create_variable(&self, workspace_path: &str, variable: CodeItem) -> Result<CodeItem> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &variable.name)?;
        let id = Uuid::new_v4().simple().to_string();
        let fingerprint = Self::next_fingerprint(&mut state);
        let created = CodeItem {
            id: id.clone(),
            path: format!("{workspace_path}/variables/{id}"),
            fingerprint,
            ..variable
        };
        state
            .variables
            .entry(workspace_path.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_variable(&self, variable: &CodeItem) -> Result<CodeItem> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &variable.name)?;
        state.update_calls.push(variable.name.clone());
        let fingerprint = Self::next_fingerprint(&mut state);
        Self::update_item(&mut state.variables, variable, fingerprint)
    }

    async fn delete_variable(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::delete_item(&mut state.variables, path)
    }

    async fn list_templates(&self, workspace_path: &str) -> Result<Vec<Template>> {
        let state = self.state.lock().unwrap();
        Ok(state.templates.get(workspace_path).cloned().unwrap_or_default())
    }

    async fn create_template(&self, workspace_path: &str, template: Template) -> Result<Template> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &template.name)?;
        let id = Uuid::new_v4().simple().to_string();
        let fingerprint = Self::next_fingerprint(&mut state);
        let created = Template {
            id: id.clone(),
            path: format!("{workspace_path}/templates/{id}"),
            fingerprint,
            ..template
        };
        state
            .templates
            .entry(workspace_path.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_template(&self, template: &Template) -> Result<Template> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state, &template.name)?;
        state.update_calls.push(template.name.clone());
        let fingerprint = Self::next_fingerprint(&mut state);
        for templates in state.templates.values_mut() {
            if let Some(stored) = templates.iter_mut().find(|t| t.path == template.path) {
                *stored = Template {
                    fingerprint,
                    ..template.clone()
                };
                return Ok(stored.clone());
            }
        }
        Err(ApiError::Http {
            status: 404,
            message: format!("no template at {}", template.path),
        })
    }
}
