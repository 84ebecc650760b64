//! FileTree builder (C4): walks backing layers in priority order and
//! produces the initial VDT honoring shadowing (§4.1).

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::FsResult;
use crate::item::FileItem;
use crate::path::casefold;
use crate::tree::{NodeId, Tree};

/// Builds the VDT from `layers` (ascending priority, `layers.last()` is the
/// highest-priority *non-write* layer) and `write_target` (exclusive
/// highest priority, see §3 `VirtualFolder`).
///
/// The write target is created on disk if absent, then conceptually pushed
/// onto the end of the layer list for the duration of the build and popped
/// afterward (§4.1 step 2) — here this is simply "visited first, but not
/// retained in any layer list the built tree exposes beyond each node's
/// `virtualDirectory` tag."
pub async fn build_tree(layers: &[PathBuf], write_target: &Path) -> FsResult<Tree> {
    tokio::fs::create_dir_all(write_target).await?;

    let root_item = FileItem::synthesize_root(write_target);
    let tree = Tree::empty(root_item);

    // Reverse priority order: write target first (highest), then each
    // configured layer from highest to lowest (§4.1 step 3).
    let mut priority_order: Vec<PathBuf> = Vec::with_capacity(layers.len() + 1);
    priority_order.push(write_target.to_path_buf());
    priority_order.extend(layers.iter().rev().cloned());

    let mut queue: VecDeque<(NodeId, PathBuf)> = VecDeque::new();
    queue.push_back((tree.root_id(), PathBuf::new()));

    while let Some((parent_id, relative)) = queue.pop_front() {
        let parent = tree.get(parent_id).expect("queued node must still exist during build");
        let mut seen: HashSet<String> = HashSet::new();

        for layer in &priority_order {
            let dir = layer.join(&relative);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue, // layer lacks this subtree: treated as empty, not an error.
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = casefold(&name);
                if !seen.insert(key) {
                    continue; // already provided by a higher-priority layer.
                }

                let meta = match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let item = FileItem::from_metadata(layer, &name, &meta);
                let is_dir = item.is_directory();
                let child = parent.add_child(&tree, item, layer.clone()).await?;
                debug!(name = %name, layer = %layer.display(), "vdt: child added");

                if is_dir {
                    queue.push_back((child.id(), relative.join(&name)));
                }
            }
        }
    }

    info!(layers = layers.len(), write_target = %write_target.display(), "vdt: build complete");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn higher_layer_shadows_lower() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let w = tempdir().unwrap();
        std::fs::write(a.path().join("readme.txt"), "old").unwrap();
        std::fs::write(b.path().join("readme.txt"), "new").unwrap();

        let tree = build_tree(&[a.path().to_path_buf(), b.path().to_path_buf()], w.path())
            .await
            .unwrap();
        let (node, _) = tree.navigate_to_any("\\readme.txt").await;
        let node = node.unwrap();
        assert_eq!(node.virtual_directory().await, b.path());
    }

    #[tokio::test]
    async fn missing_layer_subtree_is_treated_as_empty() {
        let a = tempdir().unwrap();
        let w = tempdir().unwrap();
        std::fs::create_dir(a.path().join("only_in_a")).unwrap();
        std::fs::write(a.path().join("only_in_a/f.txt"), "x").unwrap();

        let tree = build_tree(&[a.path().to_path_buf()], w.path()).await.unwrap();
        let node = tree.navigate_to_folder("\\only_in_a").await;
        assert!(node.is_some());
        let (file, _) = tree.navigate_to_any("\\only_in_a\\f.txt").await;
        assert!(file.is_some());
    }

    #[tokio::test]
    async fn write_target_is_created_if_absent() {
        let a = tempdir().unwrap();
        let w = a.path().join("does-not-exist-yet");
        build_tree(&[], &w).await.unwrap();
        assert!(w.is_dir());
    }
}
