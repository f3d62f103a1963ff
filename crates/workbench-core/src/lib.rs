//! workbench-core: the virtual-filesystem and change-staging core of a tag
//! management editor integration.
//!
//! This crate provides:
//! - Entity records for remote tags, variables, and multi-section templates,
//!   including the marker-delimited template codec
//! - An in-memory virtual tree representing loaded container/workspace units
//! - Pending-change tracking (edits and staged renames, diffed against the
//!   entity state last seen from the server)
//! - A batched, partial-failure-tolerant push that reconciles the tree with
//!   the server's authoritative responses
//! - The `TagManagerApi` trait seam for the remote REST client, with an
//!   in-memory fake for tests
//!
//! The editor shell (tree views, commands, auth) lives elsewhere and drives
//! this crate through the `Workbench` surface and its event bus.

pub mod api;
pub mod changes;
pub mod config;
pub mod entity;
pub mod events;
pub mod push;
pub mod store;
pub mod template;
pub mod tree;

pub use api::{Account, ApiError, Container, InMemoryApi, TagManagerApi, Workspace};
pub use changes::{ChangeSet, ModifiedFile, PendingChange};
pub use config::WorkbenchConfig;
pub use entity::{CodeItem, EntityRef, FolderKind, ItemKind, Parameter, Template};
pub use events::{EventBus, Subscription, WorkbenchEvent};
pub use push::{PushFailure, PushReport};
pub use store::{StoreError, UnitInfo, Workbench};
pub use template::{parse_sections, rebuild_document, replace_section, Section};
pub use tree::{Directory, FileKind, FileNode, FileStat, FsError, Node};
