//! The resolver pipeline (design §4.4): loads the root manifest and runs a
//! fixed sequence of tree transformations to a fixed point, producing the
//! flat node arena the rest of the engine operates on.
//!
//! The Open Question in spec.md §9 ("single-pass vs fixed point") is
//! resolved in favour of fixed-point iteration, as the design notes
//! recommend: the whole pipeline re-runs until a full pass changes nothing,
//! bounded by `Config::max_resolve_passes` to catch a manifest that
//! transitively imports itself.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::Config;
use crate::errors::CoreError;
use crate::manifest::model::ManifestNode;
use crate::manifest::plugins;
use crate::registry::Registry;
use crate::types::{ContentSource, NodeArena, NodeData, NodeId};
use crate::url::{ResourceUrl, UrlKind};
use crate::yaml_json::yaml_to_json;

pub struct ResolveOutcome {
    pub arena: NodeArena,
    pub root: NodeId,
}

/// Runs the full pipeline against `config.manifest_url`, returning the
/// resolved arena. See module docs for the fixed-point policy.
pub async fn resolve(registry: &Registry, config: &Config) -> Result<ResolveOutcome, CoreError> {
    let mut arena = NodeArena::new();
    let root = arena.alloc(NodeData {
        is_manifest: true,
        pending_manifest: Some(config.manifest_url.clone()),
        origin_manifest: config.manifest_url.clone(),
        ..NodeData::new(String::new())
    });

    for pass in 0..config.max_resolve_passes {
        let mut changed = false;

        changed |= load_manifest_structure(&mut arena, root, registry).await?;
        decide_node_type(&arena)?;
        changed |= calculate_paths(&mut arena, root);
        changed |= resolve_file_relative_links(&mut arena)?;
        changed |= extract_files_from_node(&mut arena, registry, config).await?;
        changed |= merge_folders(&mut arena, root)?;
        changed |= plugins::run_builtin_plugins(&mut arena, root, config)?;
        changed |= calculate_paths(&mut arena, root);
        set_parent(&mut arena, root);

        if !changed {
            debug!("manifest resolution reached a fixed point after {} pass(es)", pass + 1);
            log_orphans(&arena, root);
            return Ok(ResolveOutcome { arena, root });
        }
    }

    Err(CoreError::InvalidManifest(format!(
        "manifest resolution did not reach a fixed point after {} passes; likely a cyclic manifest import",
        config.max_resolve_passes
    )))
}

/// Step 1: `loadManifestStructure`. Finds every node whose `manifest` field
/// is still pending, fetches and YAML-parses it, and splices the resulting
/// structure into the node's parent (manifests flatten into their
/// enclosing tree -- design §4.4).
async fn load_manifest_structure(
    arena: &mut NodeArena,
    root: NodeId,
    registry: &Registry,
) -> Result<bool, CoreError> {
    let pending: Vec<NodeId> = arena
        .ids()
        .filter(|id| arena.get(*id).pending_manifest.is_some())
        .collect();

    if pending.is_empty() {
        return Ok(false);
    }

    for node_id in pending {
        let (manifest_ref, origin, own_frontmatter, parent) = {
            let node = arena.get(node_id);
            (
                node.pending_manifest.clone().expect("checked above"),
                node.origin_manifest.clone(),
                node.front_matter.clone(),
                node.parent,
            )
        };

        let manifest_url = absolutize_manifest_url(&origin, &manifest_ref)?;
        let (host_url, host) = registry
            .parse(&manifest_url)
            .map_err(|e| e.with_manifest_trail(&manifest_url))?;

        let bytes = host
            .read(&host_url)
            .await
            .map_err(|e| e.with_manifest_trail(&manifest_url))?;

        let loaded = ManifestNode::parse(&bytes)
            .map_err(|e| CoreError::InvalidManifest(format!("{manifest_url}: {e}")))?;

        let children_src = loaded.structure.clone();
        let mut child_ids = Vec::with_capacity(children_src.len());
        for child in &children_src {
            child_ids.push(build_node_tree(arena, child, &manifest_url)?);
        }

        // The node's own overlay front matter (declared alongside `manifest:`
        // in the *enclosing* manifest) wins over the loaded document's
        // top-level front matter, matching the "node values win" convention
        // used for the document front-matter hoist (design §4.7 step 3).
        let mut merged_fm = crate::types::FrontMatter::new();
        for (k, v) in &loaded.frontmatter {
            merged_fm.insert(k.clone(), yaml_to_json(v));
        }
        for (k, v) in own_frontmatter.iter() {
            merged_fm.insert(k.to_string(), v.clone());
        }

        if let Some(parent_id) = parent {
            // A manifest node with its own (or the loaded document's)
            // front matter can't just vanish in favour of its children --
            // wrap them in a transparent directory node (empty name, so it
            // contributes no path segment) that carries the merged front
            // matter, mirroring the `fileTree` wrapper below.
            let splice_target = if merged_fm.is_empty() {
                child_ids.clone()
            } else {
                let wrapper = arena.alloc(NodeData {
                    is_dir: true,
                    origin_manifest: origin.clone(),
                    front_matter: merged_fm.clone(),
                    links_resolved: true,
                    structure: child_ids.clone(),
                    ..Default::default()
                });
                for child in &child_ids {
                    arena.get_mut(*child).parent = Some(wrapper);
                }
                vec![wrapper]
            };

            let pos = arena
                .get(parent_id)
                .structure
                .iter()
                .position(|c| *c == node_id);
            if let Some(pos) = pos {
                arena
                    .get_mut(parent_id)
                    .structure
                    .splice(pos..=pos, splice_target.iter().copied());
            } else {
                arena.get_mut(parent_id).structure.extend(splice_target.iter().copied());
            }
            if merged_fm.is_empty() {
                for child in &child_ids {
                    arena.get_mut(*child).parent = Some(parent_id);
                }
            } else {
                arena.get_mut(splice_target[0]).parent = Some(parent_id);
            }
            arena.get_mut(node_id).pending_manifest = None;
        } else {
            // The node being loaded is the synthetic root: it becomes the
            // tree's container directly rather than spliced into anything.
            let node = arena.get_mut(node_id);
            node.pending_manifest = None;
            node.is_manifest = false;
            node.is_dir = true;
            node.front_matter = merged_fm.clone();
            node.structure = child_ids.clone();
            for child in &child_ids {
                arena.get_mut(*child).parent = Some(node_id);
            }
        }
    }

    let _ = root;
    Ok(true)
}

/// Recursively converts a `ManifestNode` (and its inline `structure`) into
/// arena nodes. Nested `manifest:` references are *not* followed here --
/// they're left pending for the next `load_manifest_structure` pass.
fn build_node_tree(
    arena: &mut NodeArena,
    mn: &ManifestNode,
    origin_manifest: &str,
) -> Result<NodeId, CoreError> {
    if mn.structural_field_count() != 1 {
        return Err(CoreError::InvalidManifest(format!(
            "manifest node must set exactly one of manifest/file/dir/fileTree (found {}) in {origin_manifest}",
            mn.structural_field_count()
        )));
    }

    let mut data = NodeData::new(mn.file.clone().or_else(|| mn.dir.clone()).unwrap_or_default());
    data.origin_manifest = origin_manifest.to_string();
    data.skip_validation = mn.skip_validation;
    data.processor = mn
        .processor
        .as_deref()
        .map(crate::types::Processor::from_name)
        .transpose()?;

    for (k, v) in &mn.frontmatter {
        data.front_matter.insert(k.clone(), yaml_to_json(v));
    }
    for (k, v) in &mn.properties {
        data.properties.insert(k.clone(), yaml_to_json(v));
    }

    if let Some(manifest_ref) = &mn.manifest {
        data.is_manifest = true;
        data.pending_manifest = Some(manifest_ref.clone());
    } else if let Some(dir) = &mn.dir {
        data.is_dir = true;
        data.name = dir.clone();
    } else if let Some(file_tree) = &mn.file_tree {
        // A fileTree node never also carries `dir` (structural_field_count
        // would reject that as ambiguous), so its expansion wrapper is
        // always anonymous -- it contributes no path segment of its own.
        data.is_file_tree = true;
        data.pending_file_tree = Some(file_tree.clone());
        data.name = String::new();
    } else if let Some(file) = &mn.file {
        data.name = file.clone();
        data.pending_source = mn.source.clone();
        data.pending_multi_source = mn.multi_source.clone();
    }

    // `linkResolution` keys are resource URLs; defer parsing failures to a
    // clear per-node diagnostic rather than aborting the whole manifest.
    for (url_str, path) in &mn.link_resolution {
        let absolute = if url::Url::parse(url_str).is_ok() {
            url_str.clone()
        } else {
            absolutize_manifest_url(origin_manifest, url_str)?
        };
        let resource = ResourceUrl::parse(&absolute)?;
        data.link_resolution.insert(resource, path.clone());
    }

    let node_id = arena.alloc(data);

    let mut children = Vec::with_capacity(mn.structure.len());
    for child in &mn.structure {
        children.push(build_node_tree(arena, child, origin_manifest)?);
    }
    for child in &children {
        arena.add_child(node_id, *child);
    }

    Ok(node_id)
}

fn absolutize_manifest_url(origin: &str, raw: &str) -> Result<String, CoreError> {
    if url::Url::parse(raw).is_ok() {
        return Ok(raw.to_string());
    }
    let base = ResourceUrl::parse(origin)?;
    let (blob, _tree) = base.resolve_relative(raw)?;
    Ok(blob.to_canonical_string())
}

/// Step 2: `decideNodeType`. By the time a node reaches the arena its kind
/// was already decided at construction (`build_node_tree` rejects ambiguous
/// or empty manifest nodes) -- this pass just re-asserts invariant I1 over
/// the whole tree so a future mutation that breaks it fails loudly here
/// rather than downstream.
fn decide_node_type(arena: &NodeArena) -> Result<(), CoreError> {
    for id in arena.ids() {
        let node = arena.get(id);
        let flags = [node.is_manifest, node.is_dir, node.is_file_tree, node.is_file()];
        let set = flags.iter().filter(|b| **b).count();
        if set != 1 {
            return Err(CoreError::InvalidManifest(format!(
                "node '{}' has {} structural types set, expected exactly 1",
                node.name, set
            )));
        }
    }
    Ok(())
}

/// Steps 3 & 8: `calculatePath`. Root's path is empty; a `dir` child's
/// `path` is `parent.path + "/" + parent.dir`; a node under a not-yet-spliced
/// `manifest` node inherits the parent's path unchanged.
fn calculate_paths(arena: &mut NodeArena, root: NodeId) -> bool {
    let mut changed = false;
    let mut stack = vec![(root, String::new())];
    while let Some((id, inherited)) = stack.pop() {
        if arena.get(id).path != inherited {
            arena.get_mut(id).path = inherited.clone();
            changed = true;
        }
        let node = arena.get(id);
        let child_inherited = if node.is_dir && !node.name.is_empty() {
            if inherited.is_empty() {
                node.name.clone()
            } else {
                format!("{inherited}/{}", node.name)
            }
        } else if node.is_dir {
            inherited.clone()
        } else {
            inherited.clone()
        };
        for child in node.structure.clone() {
            stack.push((child, child_inherited.clone()));
        }
    }
    changed
}

/// Step 4: `resolveFileRelativeLinks`. Absolutises a `file` node's `source`
/// (or, if `file` itself contains slashes, treats that as an implicit
/// relative source) and a `fileTree` node's tree URL, against the node's
/// `origin_manifest`.
fn resolve_file_relative_links(arena: &mut NodeArena) -> Result<bool, CoreError> {
    let mut changed = false;
    let ids: Vec<NodeId> = arena.ids().collect();

    for id in ids {
        let node = arena.get(id).clone();
        if node.links_resolved {
            continue;
        }

        if node.is_file() {
            let raw_source = node.pending_source.clone().or_else(|| {
                if node.name.contains('/') {
                    Some(node.name.clone())
                } else {
                    None
                }
            });

            if let Some(raw) = raw_source {
                let absolute = absolutize_resource(&node.origin_manifest, &raw)?;
                arena.get_mut(id).sources = vec![ContentSource { url: absolute }];
                if node.name.contains('/') {
                    let basename = node.name.rsplit('/').next().unwrap_or(&node.name).to_string();
                    arena.get_mut(id).name = basename;
                }
            }

            let mut resolved_multi = Vec::with_capacity(node.pending_multi_source.len());
            for raw in &node.pending_multi_source {
                resolved_multi.push(ContentSource {
                    url: absolutize_resource(&node.origin_manifest, raw)?,
                });
            }
            arena.get_mut(id).multi_source = resolved_multi;
            arena.get_mut(id).pending_source = None;
            arena.get_mut(id).pending_multi_source = Vec::new();
            arena.get_mut(id).links_resolved = true;
            changed = true;
        } else if node.is_file_tree {
            if let Some(raw) = &node.pending_file_tree {
                let absolute = absolutize_resource(&node.origin_manifest, raw)?;
                arena.get_mut(id).sources = vec![ContentSource { url: absolute }];
                arena.get_mut(id).pending_file_tree = None;
                arena.get_mut(id).links_resolved = true;
                changed = true;
            }
        } else {
            arena.get_mut(id).links_resolved = true;
        }
    }

    Ok(changed)
}

fn absolutize_resource(origin: &str, raw: &str) -> Result<ResourceUrl, CoreError> {
    if url::Url::parse(raw).is_ok() {
        return ResourceUrl::parse(raw);
    }
    let base = ResourceUrl::parse(origin)?;
    let (blob, _tree) = base.resolve_relative(raw)?;
    Ok(blob)
}

/// Step 5: `extractFilesFromNode`. Expands an absolutised `fileTree` node
/// into a `file` node per entry (filtered to `content_file_formats`),
/// rebuilding intermediate `dir` nodes for nested paths, then detaches the
/// `fileTree` node from its parent.
async fn extract_files_from_node(
    arena: &mut NodeArena,
    registry: &Registry,
    config: &Config,
) -> Result<bool, CoreError> {
    let pending: Vec<NodeId> = arena
        .ids()
        .filter(|id| {
            let n = arena.get(*id);
            n.is_file_tree && !n.file_tree_expanded && !n.sources.is_empty()
        })
        .collect();

    if pending.is_empty() {
        return Ok(false);
    }

    for node_id in pending {
        let (tree_url, parent, origin, dir_name, node_path) = {
            let node = arena.get(node_id);
            (
                node.sources[0].url.clone(),
                node.parent,
                node.origin_manifest.clone(),
                node.name.clone(),
                node.path.clone(),
            )
        };

        let host = registry
            .accept(&tree_url.to_canonical_string())
            .ok_or_else(|| CoreError::NotFound(tree_url.to_canonical_string()))?;
        let entries = host.tree(&tree_url, &config.content_file_formats).await?;

        let wrapper_path = if node_path.is_empty() {
            dir_name.clone()
        } else if dir_name.is_empty() {
            node_path.clone()
        } else {
            format!("{node_path}/{dir_name}")
        };

        // Build a (relative dir -> NodeId) index for intermediate
        // directories reconstructed under this fileTree's own output dir.
        let mut dir_index: HashMap<String, NodeId> = HashMap::new();
        let wrapper_id = arena.alloc(NodeData {
            is_dir: true,
            name: dir_name,
            path: node_path,
            origin_manifest: origin.clone(),
            links_resolved: true,
            ..Default::default()
        });
        dir_index.insert(String::new(), wrapper_id);

        for entry in &entries {
            let relative = entry
                .path
                .strip_prefix(tree_url.path.as_str())
                .map(|p| p.trim_start_matches('/'))
                .unwrap_or(&entry.path);
            let (rel_dir, basename) = match relative.rsplit_once('/') {
                Some((d, b)) => (d, b),
                None => ("", relative),
            };

            let parent_id = ensure_dir_chain(arena, &mut dir_index, wrapper_id, rel_dir, &origin, &wrapper_path);

            let file_id = arena.alloc(NodeData {
                name: basename.to_string(),
                origin_manifest: origin.clone(),
                sources: vec![ContentSource { url: entry.clone() }],
                links_resolved: true,
                auto_extracted: true,
                ..Default::default()
            });
            arena.add_child(parent_id, file_id);
        }

        let node = arena.get_mut(node_id);
        node.file_tree_expanded = true;

        if let Some(parent_id) = parent {
            let pos = arena
                .get(parent_id)
                .structure
                .iter()
                .position(|c| *c == node_id);
            if let Some(pos) = pos {
                arena.get_mut(parent_id).structure[pos] = wrapper_id;
            } else {
                arena.get_mut(parent_id).structure.push(wrapper_id);
            }
            arena.get_mut(wrapper_id).parent = Some(parent_id);
            arena.get_mut(node_id).parent = None;
        }
    }

    Ok(true)
}

fn ensure_dir_chain(
    arena: &mut NodeArena,
    dir_index: &mut HashMap<String, NodeId>,
    wrapper_id: NodeId,
    rel_dir: &str,
    origin: &str,
    wrapper_output_path: &str,
) -> NodeId {
    if rel_dir.is_empty() {
        return wrapper_id;
    }
    if let Some(id) = dir_index.get(rel_dir) {
        return *id;
    }

    let (parent_rel, name) = match rel_dir.rsplit_once('/') {
        Some((d, n)) => (d.to_string(), n.to_string()),
        None => (String::new(), rel_dir.to_string()),
    };
    let parent_id = ensure_dir_chain(arena, dir_index, wrapper_id, &parent_rel, origin, wrapper_output_path);
    let parent_output_path = arena.get(parent_id).output_path();
    let id = arena.alloc(NodeData {
        is_dir: true,
        name,
        path: parent_output_path,
        origin_manifest: origin.to_string(),
        links_resolved: true,
        ..Default::default()
    });
    arena.add_child(parent_id, id);
    dir_index.insert(rel_dir.to_string(), id);
    id
}

/// Step 6: `mergeFolders`. Collapses sibling `dir` nodes sharing the same
/// name into one, failing if more than one carries front matter; a
/// duplicate `file` name among siblings is always a fatal collision
/// (invariants I5/I6).
fn merge_folders(arena: &mut NodeArena, root: NodeId) -> Result<bool, CoreError> {
    let mut changed = false;
    let all_ids: Vec<NodeId> = arena.ids().collect();
    let mut parents: Vec<NodeId> = all_ids
        .into_iter()
        .filter(|id| !arena.get(*id).structure.is_empty() || *id == root)
        .collect();
    parents.sort();
    parents.dedup();

    for parent_id in parents {
        let children = arena.get(parent_id).structure.clone();

        let mut seen_files: HashMap<String, NodeId> = HashMap::new();
        let mut dir_groups: Vec<(String, Vec<NodeId>)> = Vec::new();
        let mut order: Vec<NodeId> = Vec::new();

        for child in children {
            let node = arena.get(child);
            if node.is_dir {
                if let Some(group) = dir_groups.iter_mut().find(|(name, _)| *name == node.name) {
                    group.1.push(child);
                } else {
                    dir_groups.push((node.name.clone(), vec![child]));
                    order.push(child);
                }
            } else if node.is_file() {
                if let Some(existing) = seen_files.get(&node.name) {
                    return Err(CoreError::InvalidManifest(format!(
                        "duplicate file '{}' under path '{}' (first seen as node {:?})",
                        node.name,
                        arena.get(parent_id).path,
                        existing
                    )));
                }
                seen_files.insert(node.name.clone(), child);
                order.push(child);
            } else {
                order.push(child);
            }
        }

        let mut merged_children = Vec::with_capacity(order.len());
        let mut consumed: std::collections::HashSet<NodeId> = std::collections::HashSet::new();

        for id in &order {
            if consumed.contains(id) {
                continue;
            }
            let is_dir = arena.get(*id).is_dir;
            if !is_dir {
                merged_children.push(*id);
                consumed.insert(*id);
                continue;
            }
            let name = arena.get(*id).name.clone();
            let group = dir_groups
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, ids)| ids.clone())
                .unwrap_or_default();

            if group.len() <= 1 {
                merged_children.push(*id);
                consumed.insert(*id);
                continue;
            }

            changed = true;
            let with_frontmatter: Vec<NodeId> = group
                .iter()
                .filter(|gid| !arena.get(**gid).front_matter.is_empty())
                .copied()
                .collect();
            if with_frontmatter.len() > 1 {
                return Err(CoreError::InvalidManifest(format!(
                    "multiple dirs with name {name} and path {} that have frontmatter",
                    arena.get(parent_id).path
                )));
            }

            let primary = with_frontmatter.first().copied().unwrap_or(group[0]);
            for gid in &group {
                consumed.insert(*gid);
                if *gid == primary {
                    continue;
                }
                let their_children = arena.get(*gid).structure.clone();
                for c in &their_children {
                    arena.get_mut(*c).parent = Some(primary);
                }
                arena.get_mut(primary).structure.extend(their_children);
                if arena.get(primary).front_matter.is_empty() {
                    let donor_fm = arena.get(*gid).front_matter.clone();
                    arena.get_mut(primary).front_matter = donor_fm;
                }
            }
            merged_children.push(primary);
        }

        if merged_children != arena.get(parent_id).structure {
            arena.get_mut(parent_id).structure = merged_children;
            changed = true;
        }
    }

    Ok(changed)
}

/// Step 9: `setParent`. Re-derives every node's `parent` back-reference
/// top-down from the (possibly just-mutated) `structure` lists.
fn set_parent(arena: &mut NodeArena, root: NodeId) {
    arena.get_mut(root).parent = None;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let children = arena.get(id).structure.clone();
        for child in &children {
            arena.get_mut(*child).parent = Some(id);
            stack.push(*child);
        }
    }
}

pub(crate) fn log_orphans(arena: &NodeArena, root: NodeId) {
    let reachable = {
        let mut set = std::collections::HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if set.insert(id) {
                stack.extend(arena.get(id).structure.clone());
            }
        }
        set
    };
    let orphans = arena.ids().filter(|id| !reachable.contains(id)).count();
    if orphans > 0 {
        warn!("{orphans} node(s) detached during resolution (spliced manifests/expanded fileTrees)");
    }
}
