//! Virtual tree nodes and addressing.
//!
//! The store owns every node; nothing outside it holds references into the
//! tree. Addresses are slash-delimited and percent-decoded segment by
//! segment, since container and workspace display names may carry spaces or
//! other characters the editor escapes.

use crate::entity::{EntityRef, ItemKind};

use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("no permissions: {0}")]
    NoPermission(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Node kind reported through the stat/list contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata returned by `stat`.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    pub ctime: u64,
    pub mtime: u64,
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A file in the virtual tree: the currently displayed buffer plus a
/// back-reference to the owning entity as last known from the server.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub data: Vec<u8>,
    pub ctime: u64,
    pub mtime: u64,
    pub entity: EntityRef,
    pub kind: ItemKind,
    /// Section marker name, set only for template sections.
    pub marker: Option<String>,
}

impl FileNode {
    pub fn new(data: Vec<u8>, entity: EntityRef, kind: ItemKind, marker: Option<String>) -> Self {
        let now = now_millis();
        Self {
            data,
            ctime: now,
            mtime: now,
            entity,
            kind,
            marker,
        }
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.mtime = now_millis();
    }

    pub fn stat(&self) -> FileStat {
        FileStat {
            kind: FileKind::File,
            size: self.data.len() as u64,
            ctime: self.ctime,
            mtime: self.mtime,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Dir(Directory),
    File(FileNode),
}

impl Node {
    pub fn kind(&self) -> FileKind {
        match self {
            Node::Dir(_) => FileKind::Directory,
            Node::File(_) => FileKind::File,
        }
    }

    pub fn stat(&self) -> FileStat {
        match self {
            Node::Dir(dir) => dir.stat(),
            Node::File(file) => file.stat(),
        }
    }
}

/// A named, order-irrelevant mapping from child name to child node.
#[derive(Debug, Clone)]
pub struct Directory {
    pub children: HashMap<String, Node>,
    pub ctime: u64,
    pub mtime: u64,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            children: HashMap::new(),
            ctime: now,
            mtime: now,
        }
    }

    pub fn stat(&self) -> FileStat {
        FileStat {
            kind: FileKind::Directory,
            size: 0,
            ctime: self.ctime,
            mtime: self.mtime,
        }
    }

    /// Insert a child, displacing any existing entry of the same name.
    /// Sanitized display names are not de-duplicated, so a collision means
    /// the previous node is gone.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) {
        let name = name.into();
        if self.children.insert(name.clone(), node).is_some() {
            warn!(name = %name, "tree entry displaced by a name collision");
        }
        self.mtime = now_millis();
    }

    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let removed = self.children.remove(name);
        if removed.is_some() {
            self.mtime = now_millis();
        }
        removed
    }

    /// Resolve an address to a node. `Ok(None)` means the address names this
    /// directory itself (empty after trimming).
    pub fn lookup(&self, address: &str) -> Result<Option<&Node>> {
        let segments = split_address(address);
        if segments.is_empty() {
            return Ok(None);
        }
        let mut dir = self;
        for (i, segment) in segments.iter().enumerate() {
            let node = dir
                .children
                .get(segment)
                .ok_or_else(|| FsError::NotFound(address.to_string()))?;
            if i + 1 == segments.len() {
                return Ok(Some(node));
            }
            match node {
                Node::Dir(next) => dir = next,
                Node::File(_) => return Err(FsError::NotADirectory(address.to_string())),
            }
        }
        unreachable!("segments is non-empty");
    }

    pub fn lookup_mut(&mut self, address: &str) -> Result<Option<&mut Node>> {
        let segments = split_address(address);
        if segments.is_empty() {
            return Ok(None);
        }
        let mut dir = self;
        for (i, segment) in segments.iter().enumerate() {
            if i + 1 == segments.len() {
                return match dir.children.get_mut(segment) {
                    Some(node) => Ok(Some(node)),
                    None => Err(FsError::NotFound(address.to_string())),
                };
            }
            match dir.children.get_mut(segment) {
                Some(Node::Dir(next)) => dir = next,
                Some(Node::File(_)) => return Err(FsError::NotADirectory(address.to_string())),
                None => return Err(FsError::NotFound(address.to_string())),
            }
        }
        unreachable!("segments is non-empty");
    }

    pub fn dir_at(&self, address: &str) -> Result<&Directory> {
        match self.lookup(address)? {
            None => Ok(self),
            Some(Node::Dir(dir)) => Ok(dir),
            Some(Node::File(_)) => Err(FsError::NotADirectory(address.to_string())),
        }
    }

    pub fn dir_at_mut(&mut self, address: &str) -> Result<&mut Directory> {
        // Resolve through lookup_mut; the root case needs a reborrow.
        if split_address(address).is_empty() {
            return Ok(self);
        }
        match self.lookup_mut(address)? {
            Some(Node::Dir(dir)) => Ok(dir),
            _ => Err(FsError::NotADirectory(address.to_string())),
        }
    }

    pub fn file_at(&self, address: &str) -> Result<&FileNode> {
        match self.lookup(address)? {
            Some(Node::File(file)) => Ok(file),
            Some(Node::Dir(_)) | None => Err(FsError::NotAFile(address.to_string())),
        }
    }

    pub fn file_at_mut(&mut self, address: &str) -> Result<&mut FileNode> {
        match self.lookup_mut(address)? {
            Some(Node::File(file)) => Ok(file),
            Some(Node::Dir(_)) | None => Err(FsError::NotAFile(address.to_string())),
        }
    }
}

/// Split an address into percent-decoded segments, dropping empty ones.
pub fn split_address(address: &str) -> Vec<String> {
    address
        .split('/')
        .filter(|s| !s.is_empty())
        .map(percent_decode)
        .collect()
}

/// Split an address into its parent address and decoded final segment.
pub fn split_parent(address: &str) -> Option<(String, String)> {
    let mut segments = split_address(address);
    let last = segments.pop()?;
    Some((segments.join("/"), last))
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Decode `%XX` escapes in one address segment. Invalid escapes pass through
/// verbatim.
pub fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Derive a file name from an entity display name: trim, then replace every
/// character outside `[A-Za-z0-9_.-]` with `_` ("Test Var" becomes
/// "Test_Var").
pub fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive a directory name from a container or workspace display name. Only
/// path-breaking characters are replaced; spaces survive (addresses escape
/// them).
pub fn sanitize_segment(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CodeItem, EntityRef};

    fn file() -> Node {
        Node::File(FileNode::new(
            b"body".to_vec(),
            EntityRef::Item(CodeItem {
                id: "1".into(),
                name: "X".into(),
                item_type: "html".into(),
                parameter: vec![],
                fingerprint: "1".into(),
                path: "p".into(),
            }),
            ItemKind::Tag,
            None,
        ))
    }

    fn tree() -> Directory {
        let mut inner = Directory::new();
        inner.insert("file.js", file());
        let mut root = Directory::new();
        let mut mid = Directory::new();
        mid.insert("My Workspace", Node::Dir(inner));
        root.insert("My Container", Node::Dir(mid));
        root
    }

    #[test]
    fn lookup_resolves_nested_path() {
        let root = tree();
        let node = root
            .lookup("My Container/My Workspace/file.js")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind(), FileKind::File);
    }

    #[test]
    fn lookup_decodes_percent_escapes_per_segment() {
        let root = tree();
        let node = root
            .lookup("My%20Container/My%20Workspace/file.js")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind(), FileKind::File);
    }

    #[test]
    fn lookup_missing_segment_is_not_found() {
        let root = tree();
        assert!(matches!(
            root.lookup("My Container/Nope/file.js"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn lookup_through_a_file_is_not_a_directory() {
        let root = tree();
        assert!(matches!(
            root.lookup("My Container/My Workspace/file.js/deeper"),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn file_at_on_directory_is_not_a_file() {
        let root = tree();
        assert!(matches!(
            root.file_at("My Container/My Workspace"),
            Err(FsError::NotAFile(_))
        ));
    }

    #[test]
    fn dir_at_empty_address_is_the_root() {
        let root = tree();
        assert_eq!(root.dir_at("").unwrap().children.len(), 1);
        assert_eq!(root.dir_at("/").unwrap().children.len(), 1);
    }

    #[test]
    fn percent_decode_handles_invalid_escapes() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize_file_name("Test Var"), "Test_Var");
        assert_eq!(sanitize_file_name("a/b:c?d"), "a_b_c_d");
        assert_eq!(sanitize_file_name("  padded  "), "padded");
    }

    #[test]
    fn sanitize_segment_keeps_spaces() {
        assert_eq!(sanitize_segment("My Container"), "My Container");
        assert_eq!(sanitize_segment("a/b"), "a_b");
    }

    #[test]
    fn split_parent_separates_last_segment() {
        let (parent, name) = split_parent("a/b/c.js").unwrap();
        assert_eq!(parent, "a/b");
        assert_eq!(name, "c.js");
        assert!(split_parent("").is_none());
    }
}
