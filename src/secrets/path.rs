//! Addressing of nodes in a mounted secret tree.
//!
//! A node is a root (empty name), a folder (name ends in `/`) or a leaf
//! (anything else). The store reports folders with a trailing `/` in list
//! responses; that marker is the only thing used to tell the kinds apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter between folder segments
pub const DELIMITER: char = '/';

/// The kind of a node, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Folder,
    Leaf,
}

/// Location of a node within a mount.
///
/// `path` is the folder chain above the node: empty, or `/`-terminated.
/// `path + name` is the key passed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretPath {
    /// Engine mount as listed in the mount table, e.g. `secret/`
    pub mount: String,
    pub path: String,
    pub name: String,
}

impl SecretPath {
    /// The root of a mount
    pub fn root(mount: impl Into<String>) -> Self {
        Self { mount: mount.into(), path: String::new(), name: String::new() }
    }

    /// Address a leaf by its full key, e.g. `app/db/password`.
    ///
    /// `None` when the key cannot name a leaf: empty, or ending in the
    /// delimiter.
    pub fn leaf(mount: impl Into<String>, key: &str) -> Option<Self> {
        let key = key.trim_start_matches(DELIMITER);
        if key.is_empty() || key.ends_with(DELIMITER) {
            return None;
        }

        let (path, name) = match key.rfind(DELIMITER) {
            Some(idx) => (&key[..=idx], &key[idx + 1..]),
            None => ("", key),
        };

        Some(Self { mount: mount.into(), path: path.to_string(), name: name.to_string() })
    }

    /// The deepest folder containing every key that starts with `prefix`.
    ///
    /// `app/db` lives under `app/`, `app/db/` is itself that folder and a
    /// prefix without a delimiter resolves to the mount root.
    pub fn folder_for_prefix(mount: impl Into<String>, prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches(DELIMITER);
        let folder = match prefix.rfind(DELIMITER) {
            Some(idx) => &prefix[..=idx],
            None => return Self::root(mount),
        };

        // split "a/b/" into path "a/" and name "b/"
        let trimmed = &folder[..folder.len() - 1];
        let (path, name) = match trimmed.rfind(DELIMITER) {
            Some(idx) => (&folder[..=idx], &folder[idx + 1..]),
            None => ("", folder),
        };

        Self { mount: mount.into(), path: path.to_string(), name: name.to_string() }
    }

    pub fn kind(&self) -> NodeKind {
        if self.name.is_empty() {
            NodeKind::Root
        } else if self.name.ends_with(DELIMITER) {
            NodeKind::Folder
        } else {
            NodeKind::Leaf
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == NodeKind::Leaf
    }

    /// Full key of the node below its mount (`path + name`)
    pub fn key(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    /// Address of a child reported by listing this node
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self { mount: self.mount.clone(), path: self.key(), name: name.into() }
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.mount, self.path, self.name)
    }
}

/// Normalise a mount name to the mount-table form with one trailing `/`
pub fn normalize_mount(mount: &str) -> String {
    format!("{}{}", mount.trim_matches(DELIMITER), DELIMITER)
}
