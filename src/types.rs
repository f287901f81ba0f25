//! The node arena: every manifest, directory, and content file produced by
//! the resolver lives here as a `NodeData` addressed by a `NodeId` handle.
//!
//! Using integer handles instead of `Rc<RefCell<..>>` keeps the structure
//! tree free of shared-ownership cycles -- a node's children are `NodeId`s
//! into the same arena, and its parent back-reference is just another one.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;

use crate::url::ResourceUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// An ordered front-matter map: insertion order is preserved so re-rendered
/// front matter reads the same as the source instead of being resorted
/// alphabetically by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct FrontMatter {
    entries: Vec<(String, JsonValue)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `aliases` onto any existing `aliases` list rather than
    /// overwriting it, matching the hoist rule for multi-source documents.
    pub fn append_aliases(&mut self, aliases: &[String]) {
        if aliases.is_empty() {
            return;
        }
        let mut merged: Vec<JsonValue> = self
            .get("aliases")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        merged.extend(aliases.iter().map(|a| JsonValue::String(a.clone())));
        self.insert("aliases", JsonValue::Array(merged));
    }
}

/// Extra bytes fetched alongside a Markdown's front matter: last-modified
/// time, author, contributors, and the source URL, derived from commit
/// history rather than the front matter block.
#[derive(Debug, Clone, Default)]
pub struct GitInfo {
    pub last_modified_date: Option<String>,
    pub publish_date: Option<String>,
    pub author: Option<String>,
    pub contributors: Vec<String>,
    pub web_url: Option<String>,
    pub sha: Option<String>,
    pub sha_alias: Option<String>,
    pub path: Option<String>,
}

/// One location a document's content can be assembled from. Multiple
/// sources on a single node are concatenated in declaration order.
#[derive(Debug, Clone)]
pub struct ContentSource {
    pub url: ResourceUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    /// Pass bytes through unmodified (binary assets, non-Markdown files).
    Passthrough,
    /// Parse as Markdown, rewrite links, merge front matter.
    Markdown,
}

impl Processor {
    pub fn from_name(name: &str) -> Result<Self, crate::errors::CoreError> {
        match name {
            "markdown" => Ok(Processor::Markdown),
            "passthrough" => Ok(Processor::Passthrough),
            other => Err(crate::errors::CoreError::InvalidManifest(format!(
                "unknown processor '{other}', expected 'markdown' or 'passthrough'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub name: String,
    /// Ancestor-dir path, slash-separated, *excluding* this node's own name
    /// (invariant I2). The node's own output path is `output_path()`.
    pub path: String,
    pub is_manifest: bool,
    pub is_dir: bool,
    pub is_file_tree: bool,
    /// First (and usually only) content source. Empty for a pure
    /// front-matter section index (`file = "_index.md"`, invariant I3).
    pub sources: Vec<ContentSource>,
    /// Extra sources appended after `sources[0]`, concatenated in order
    /// during document assembly (the manifest's `multiSource`).
    pub multi_source: Vec<ContentSource>,
    /// Raw `source` string as written in the manifest, pending
    /// absolutisation against `origin_manifest` (`resolveFileRelativeLinks`).
    /// `None` once consumed into `sources`.
    pub pending_source: Option<String>,
    pub pending_multi_source: Vec<String>,
    /// Raw `fileTree` URL, pending absolutisation.
    pub pending_file_tree: Option<String>,
    /// Raw `manifest` URL, pending absolutisation/fetch/splice. `None` once
    /// the manifest has been loaded and spliced into the tree.
    pub pending_manifest: Option<String>,
    pub properties: BTreeMap<String, JsonValue>,
    pub front_matter: FrontMatter,
    pub processor: Option<Processor>,
    pub skip_validation: bool,
    /// Per-node overrides for ambiguous relative-link resolution: a resource
    /// URL appearing in this node's documents maps to the single output path
    /// its link should resolve to, restricting `ResolveResourceLink`'s
    /// candidate set (design §4.5 step 4).
    pub link_resolution: HashMap<ResourceUrl, String>,
    pub structure: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub git_info: Option<GitInfo>,
    pub persona: Option<String>,
    /// The manifest URL this node (or its nearest dir/manifest ancestor)
    /// was declared in -- relative `source`/`fileTree` URLs absolutise
    /// against this, per "resolveFileRelativeLinks" (design §4.4 step 4).
    pub origin_manifest: String,
    /// Set once `decideNodeType` has classified this node; lets the
    /// pipeline recognise a transformation that changed nothing so the
    /// fixed-point loop can detect quiescence.
    pub typified: bool,
    pub links_resolved: bool,
    pub file_tree_expanded: bool,
    /// Set on file nodes synthesized by `fileTree` expansion, as opposed to
    /// ones declared directly in a manifest's `structure` list.
    pub auto_extracted: bool,
}

impl NodeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A node has renderable content unless it's a synthesised section
    /// index (`file == "_index.md"` with no source) -- design §4.7 step 1.
    pub fn has_content(&self) -> bool {
        !(self.name == "_index.md" && self.sources.is_empty())
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir && !self.is_manifest && !self.is_file_tree
    }

    /// The node's full output path, slash-joined, including its own name.
    pub fn output_path(&self) -> String {
        if self.path.is_empty() {
            self.name.clone()
        } else if self.name.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, self.name)
        }
    }
}

/// Owns every `NodeData` produced while resolving a manifest. Nodes are
/// never removed once allocated; folding two manifest entries into one
/// node happens by rewriting `structure`/`parent`, not by freeing slots.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<NodeData>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].structure.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Walks up `parent` links to the root, yielding the ancestor chain
    /// root-first. Used as a fallback when `path` hasn't been (re)computed.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            out.push(n);
            cur = self.nodes[n.0].parent;
        }
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_matter_preserves_insertion_order() {
        let mut fm = FrontMatter::new();
        fm.insert("title", JsonValue::String("a".into()));
        fm.insert("weight", JsonValue::from(3));
        let keys: Vec<&str> = fm.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "weight"]);
    }

    #[test]
    fn front_matter_append_aliases_merges() {
        let mut fm = FrontMatter::new();
        fm.insert(
            "aliases",
            JsonValue::Array(vec![JsonValue::String("/old".into())]),
        );
        fm.append_aliases(&["/new".to_string()]);
        let aliases = fm.get("aliases").unwrap().as_array().unwrap();
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn arena_tracks_parent_child() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(NodeData::new("root"));
        let child = arena.alloc(NodeData::new("child"));
        arena.add_child(root, child);
        assert_eq!(arena.get(child).parent, Some(root));
        assert_eq!(arena.get(root).structure, vec![child]);
        assert_eq!(arena.ancestors(child), vec![root, child]);
    }
}
