//! Built-in plugin transforms (design §4.4 step 7): a fixed list of small,
//! independent tree rewrites that run every fixed-point pass alongside the
//! structural steps. Persona hoisting and alias propagation run first so the
//! later steps see the tree in its final shape for this pass.

use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::errors::CoreError;
use crate::types::{NodeArena, NodeData, NodeId, Processor};

pub fn run_builtin_plugins(
    arena: &mut NodeArena,
    root: NodeId,
    config: &Config,
) -> Result<bool, CoreError> {
    let mut changed = false;
    changed |= hoist_persona_folders(arena, config);
    changed |= propagate_aliases(arena, root);
    changed |= assign_processors(arena, config);
    changed |= inject_docsy_fields(arena);
    changed |= filter_content_formats(arena, config);
    Ok(changed)
}

/// Replaces a directory named in `config.persona_dirs` (e.g. `development`,
/// `operations`, `usage`) with its own children in place, tagging each with
/// `frontmatter.persona = <dirname>` so the Docsy-style persona switcher can
/// find them without the extra path segment.
fn hoist_persona_folders(arena: &mut NodeArena, config: &Config) -> bool {
    let mut changed = false;
    let parent_ids: Vec<NodeId> = arena.ids().collect();

    for parent_id in parent_ids {
        let children = arena.get(parent_id).structure.clone();
        if children.is_empty() {
            continue;
        }

        let mut new_children = Vec::with_capacity(children.len());
        for child in children {
            let node = arena.get(child);
            let is_persona_dir = node.is_dir
                && node.persona.is_none()
                && config.persona_dirs.iter().any(|p| *p == node.name);

            if !is_persona_dir {
                new_children.push(child);
                continue;
            }

            changed = true;
            let persona_name = node.name.clone();
            let grandchildren = node.structure.clone();
            for gc in &grandchildren {
                let gc_node = arena.get_mut(*gc);
                gc_node.parent = Some(parent_id);
                if gc_node.persona.is_none() {
                    gc_node.persona = Some(persona_name.clone());
                    gc_node
                        .front_matter
                        .insert("persona", JsonValue::String(persona_name.clone()));
                }
            }
            new_children.extend(grandchildren);
        }

        if new_children != arena.get(parent_id).structure {
            arena.get_mut(parent_id).structure = new_children;
        }
    }

    changed
}

fn read_aliases(node: &NodeData) -> Vec<String> {
    node.front_matter
        .get("aliases")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// A directory's `aliases` front matter is inherited by every descendant
/// file, appended to (never replacing) that file's own aliases -- so a
/// renamed section keeps every one of its old files reachable at their old
/// URL. Computed as a plain set union each pass rather than an append so the
/// pipeline reaches a fixed point instead of growing the list forever.
fn propagate_aliases(arena: &mut NodeArena, root: NodeId) -> bool {
    let mut changed = false;
    let mut stack = vec![(root, Vec::<String>::new())];

    while let Some((id, inherited)) = stack.pop() {
        let own = read_aliases(arena.get(id));
        let mut combined = inherited.clone();
        for a in &own {
            if !combined.contains(a) {
                combined.push(a.clone());
            }
        }

        let node = arena.get(id);
        if node.is_file() {
            let current = read_aliases(node);
            if combined != current && !combined.is_empty() {
                let arr = combined.iter().cloned().map(JsonValue::String).collect();
                arena.get_mut(id).front_matter.insert("aliases", JsonValue::Array(arr));
                changed = true;
            }
        }

        let children = arena.get(id).structure.clone();
        for child in children {
            stack.push((child, combined.clone()));
        }
    }

    changed
}

/// Assigns a `Processor` to every file node that doesn't already have one
/// (an explicit `processor:` in the manifest always wins): Markdown for
/// `content_file_formats` extensions, Passthrough otherwise.
fn assign_processors(arena: &mut NodeArena, config: &Config) -> bool {
    let mut changed = false;
    for id in arena.ids() {
        let node = arena.get(id);
        if !node.is_file() || node.processor.is_some() {
            continue;
        }
        let is_markdown = config
            .content_file_formats
            .iter()
            .any(|ext| node.name.ends_with(ext.as_str()));
        let processor = if is_markdown { Processor::Markdown } else { Processor::Passthrough };
        arena.get_mut(id).processor = Some(processor);
        changed = true;
    }
    changed
}

/// Stamps `github_repo`/`github_subdir`/`path_base_for_github_subdir` onto
/// every Markdown file's front matter, derived from its resolved source URL
/// -- the fields Docsy's "view source"/"edit this page" links read.
fn inject_docsy_fields(arena: &mut NodeArena) -> bool {
    let mut changed = false;
    for id in arena.ids() {
        let node = arena.get(id);
        if node.processor != Some(Processor::Markdown)
            || node.sources.is_empty()
            || node.front_matter.get("github_repo").is_some()
        {
            continue;
        }

        let source = &node.sources[0].url;
        let repo = format!("https://{}/{}/{}", source.host, source.owner, source.repo);
        let subdir = match source.path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };
        let base = format!("{repo}/tree/{}", source.reference);

        let node = arena.get_mut(id);
        node.front_matter.insert("github_repo", JsonValue::String(repo));
        node.front_matter.insert("github_subdir", JsonValue::String(subdir));
        node.front_matter
            .insert("path_base_for_github_subdir", JsonValue::String(base));
        changed = true;
    }
    changed
}

/// Re-asserts the `content_file_formats` filter already applied when a
/// `fileTree` is expanded (`Registry::tree` is called with the same list):
/// drops any auto-extracted file whose name no longer matches.
fn filter_content_formats(arena: &mut NodeArena, config: &Config) -> bool {
    let mut changed = false;
    let parent_ids: Vec<NodeId> = arena.ids().collect();

    for parent_id in parent_ids {
        let children = arena.get(parent_id).structure.clone();
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            let node = arena.get(child);
            let drop = node.is_file()
                && node.auto_extracted
                && !config.content_file_formats.iter().any(|ext| node.name.ends_with(ext.as_str()));
            if drop {
                changed = true;
            } else {
                kept.push(child);
            }
        }
        if kept != arena.get(parent_id).structure {
            arena.get_mut(parent_id).structure = kept;
        }
    }

    changed
}
