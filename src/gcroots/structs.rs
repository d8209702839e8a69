//! The structs
//!
use indexmap::IndexMap;

/// An object in a root chain. The id is the object address as printed by `gcroot`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub category: Option<String>,
}

/// A reference from one object to another.
/// Source and target are node ids, the link id is `<source>-><target>`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub label: Option<String>,
    pub category: Option<String>,
}

/// The graph holds the nodes and links in the order they were first seen.
/// Adding an existing node or link again returns the existing one.
#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: IndexMap<String, Node>,
    pub links: IndexMap<String, Link>,
}
