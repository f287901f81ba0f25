//! The on-disk manifest shape, decoded straight off YAML bytes with
//! `serde_yaml`. Exactly one of `manifest`/`file`/`dir`/`file_tree` is
//! expected to be set per node -- that invariant is enforced later by
//! `decide_node_type`, not by the type itself, so a malformed manifest still
//! deserializes and can be reported with a useful path.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

fn default_structure() -> Vec<ManifestNode> {
    Vec::new()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ManifestNode {
    pub manifest: Option<String>,
    pub file: Option<String>,
    pub dir: Option<String>,
    #[serde(rename = "fileTree")]
    pub file_tree: Option<String>,

    pub source: Option<String>,
    #[serde(rename = "multiSource", default)]
    pub multi_source: Vec<String>,

    #[serde(default)]
    pub frontmatter: BTreeMap<String, Value>,

    #[serde(default)]
    pub properties: BTreeMap<String, Value>,

    pub processor: Option<String>,
    #[serde(rename = "skipValidation", default)]
    pub skip_validation: bool,

    #[serde(rename = "linkResolution", default)]
    pub link_resolution: BTreeMap<String, String>,

    #[serde(default = "default_structure")]
    pub structure: Vec<ManifestNode>,
}

impl ManifestNode {
    pub fn parse(bytes: &[u8]) -> Result<ManifestNode, serde_yaml::Error> {
        serde_yaml::from_slice(bytes)
    }

    /// How many of the four structural fields are populated.
    pub fn structural_field_count(&self) -> usize {
        [
            self.manifest.is_some(),
            self.file.is_some(),
            self.dir.is_some(),
            self.file_tree.is_some(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_dir_node() {
        let yaml = b"dir: guides\nstructure:\n  - file: intro.md\n    source: https://github.com/o/r/blob/main/intro.md\n";
        let node = ManifestNode::parse(yaml).unwrap();
        assert_eq!(node.dir.as_deref(), Some("guides"));
        assert_eq!(node.structure.len(), 1);
        assert_eq!(node.structure[0].file.as_deref(), Some("intro.md"));
    }

    #[test]
    fn structural_field_count_detects_ambiguity() {
        let mut node = ManifestNode::default();
        assert_eq!(node.structural_field_count(), 0);
        node.dir = Some("x".into());
        assert_eq!(node.structural_field_count(), 1);
        node.file = Some("y".into());
        assert_eq!(node.structural_field_count(), 2);
    }

    #[test]
    fn parses_frontmatter_and_link_resolution() {
        let yaml = br#"
file: a.md
source: https://github.com/o/r/blob/main/a.md
frontmatter:
  title: Hello
linkResolution:
  https://github.com/o/r/blob/main/b.md: /guides/b
"#;
        let node = ManifestNode::parse(yaml).unwrap();
        assert_eq!(
            node.frontmatter.get("title").and_then(|v| v.as_str()),
            Some("Hello")
        );
        assert_eq!(node.link_resolution.len(), 1);
    }
}
