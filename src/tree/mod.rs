//! FileNode / VDT (C3): the merged in-memory tree.
//!
//! Modeled as an arena of nodes addressed by stable indices rather than as
//! an ownership graph with parent back-pointers: this avoids an ownership
//! cycle between parent and children and lets lock ordering be expressed as
//! plain index comparison. The arena's structural bookkeeping (`nodes`,
//! `next_id`) is guarded by a plain `std::sync::RwLock` since it is only
//! ever held across synchronous pointer manipulation, never across an
//! `.await`; each node's own content sits behind its own per-node
//! `tokio::sync::RwLock`.

pub mod builder;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::{FsResult, NtStatus};
use crate::item::FileItem;
use crate::path;

/// Stable index identifying a node inside a [`Tree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Case-insensitive map key that remembers the casing of first insertion.
#[derive(Debug, Clone)]
struct CaseFoldKey(String);

impl PartialEq for CaseFoldKey {
    fn eq(&self, other: &Self) -> bool {
        path::casefold(&self.0) == path::casefold(&other.0)
    }
}
impl Eq for CaseFoldKey {}
impl std::hash::Hash for CaseFoldKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        path::casefold(&self.0).hash(state);
    }
}

struct NodeInner {
    item: FileItem,
    name_lower: String,
    virtual_directory: PathBuf,
    children: IndexMap<CaseFoldKey, NodeId>,
}

/// One entry in the merged tree (§3). Children and the mutable parts of the
/// item live behind a single per-node `RwLock`: readers may overlap,
/// writers are exclusive.
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    inner: RwLock<NodeInner>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent
    }

    pub async fn is_directory(&self) -> bool {
        self.inner.read().await.item.is_directory()
    }

    pub async fn name(&self) -> String {
        self.inner.read().await.item.name.clone()
    }

    pub async fn name_lower(&self) -> String {
        self.inner.read().await.name_lower.clone()
    }

    pub async fn item_snapshot(&self) -> FileItem {
        self.inner.read().await.item.clone()
    }

    pub async fn full_path(&self) -> PathBuf {
        self.inner.read().await.item.full_path()
    }

    pub async fn full_path_with_prefix(&self) -> PathBuf {
        self.inner.read().await.item.full_path_with_prefix()
    }

    pub async fn virtual_directory(&self) -> PathBuf {
        self.inner.read().await.virtual_directory.clone()
    }

    /// Relative path from the VDT root, computed by walking parents one at a
    /// time (never nested), so this cannot violate the parent-before-child
    /// lock-ordering discipline used elsewhere.
    pub async fn relative_path(&self, tree: &Tree) -> PathBuf {
        let mut segments = Vec::new();
        let mut current = self.id;
        loop {
            let node = tree.get(current).expect("node in its own ancestor chain must exist");
            let name = node.name().await;
            if !name.is_empty() {
                segments.push(name);
            }
            match node.parent_id() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        let mut out = PathBuf::new();
        for s in segments {
            out.push(s);
        }
        out
    }

    /// Iterates children under a shared lock (§4.2 `walkChildren`); the
    /// visitor may return `false` to stop early.
    pub async fn walk_children<F>(&self, tree: &Tree, mut visitor: F)
    where
        F: FnMut(Arc<Node>) -> bool,
    {
        let children: Vec<NodeId> = self.inner.read().await.children.values().copied().collect();
        for id in children {
            if let Some(child) = tree.get(id) {
                if !visitor(child) {
                    break;
                }
            }
        }
    }

    /// Depth-first, pre-order traversal of this node's whole subtree (§4.2
    /// `walkTree`), implemented iteratively so no node's lock is ever held
    /// while visiting its descendants.
    pub async fn walk_tree<F>(&self, tree: &Tree, mut visitor: F)
    where
        F: FnMut(Arc<Node>),
    {
        let mut stack: Vec<NodeId> = {
            let inner = self.inner.read().await;
            let mut v: Vec<NodeId> = inner.children.values().copied().collect();
            v.reverse();
            v
        };
        while let Some(id) = stack.pop() {
            let Some(node) = tree.get(id) else { continue };
            visitor(node.clone());
            let mut grandchildren: Vec<NodeId> = {
                let inner = node.inner.read().await;
                let mut v: Vec<NodeId> = inner.children.values().copied().collect();
                v.reverse();
                v
            };
            // Push so the first child is processed next (pre-order).
            while let Some(g) = grandchildren.pop() {
                stack.push(g);
            }
        }
    }

    /// Inserts a new child under this node's write lock (§4.2 `addChild`).
    pub async fn add_child(
        self: &Arc<Self>,
        tree: &Tree,
        item: FileItem,
        virtual_directory: PathBuf,
    ) -> FsResult<Arc<Node>> {
        let mut guard = self.inner.write().await;
        let key = CaseFoldKey(item.name.clone());
        if guard.children.contains_key(&key) {
            return Err(NtStatus::AlreadyExists);
        }
        let name_lower = path::casefold(&item.name);
        let child = tree.alloc_with_parent(
            self.id,
            NodeInner { item, name_lower, virtual_directory, children: IndexMap::new() },
        );
        guard.children.insert(key, child.id);
        Ok(child)
    }

    /// Detaches this node from its parent's children map under the parent's
    /// write lock (§4.2 `removeThisChild`), then frees its arena slot.
    pub async fn remove_this_child(self: &Arc<Self>, tree: &Tree) -> FsResult<()> {
        let Some(parent_id) = self.parent else {
            return Err(NtStatus::InternalError);
        };
        let parent = tree.get(parent_id).ok_or(NtStatus::InternalError)?;
        let name = self.name().await;
        {
            let mut guard = parent.inner.write().await;
            guard.children.shift_remove(&CaseFoldKey(name));
        }
        tree.free(self.id);
        Ok(())
    }

    /// Moves `other`'s item into `self` (§4.2 `takeItem`), used after a
    /// successful rename-replace or cross-directory move.
    pub async fn take_item(&self, other: &FileItem, other_virtual_directory: PathBuf) {
        let mut guard = self.inner.write().await;
        guard.item.attributes = other.attributes;
        guard.item.creation_time = other.creation_time;
        guard.item.last_access_time = other.last_access_time;
        guard.item.modification_time = other.modification_time;
        guard.item.file_size = other.file_size;
        guard.virtual_directory = other_virtual_directory;
    }

    /// Renames this node in place (§4.2 `setName`). Must be called while the
    /// caller holds no lock on this node; the parent's write lock is taken
    /// internally to rekey the children map atomically with the rename.
    pub async fn set_name(self: &Arc<Self>, tree: &Tree, new_name: String) -> FsResult<()> {
        let Some(parent_id) = self.parent else {
            return Err(NtStatus::InternalError);
        };
        let parent = tree.get(parent_id).ok_or(NtStatus::InternalError)?;
        let old_name = self.name().await;
        let mut parent_guard = parent.inner.write().await;
        if parent_guard.children.contains_key(&CaseFoldKey(new_name.clone())) {
            return Err(NtStatus::AlreadyExists);
        }
        let id = parent_guard
            .children
            .shift_remove(&CaseFoldKey(old_name))
            .ok_or(NtStatus::InternalError)?;
        parent_guard.children.insert(CaseFoldKey(new_name.clone()), id);
        drop(parent_guard);

        let mut guard = self.inner.write().await;
        guard.item.name = new_name.clone();
        guard.name_lower = path::casefold(&new_name);
        Ok(())
    }

    /// Copies attributes/times/sizes (not children) from `other` (§4.2
    /// `copyBasicAttributes`).
    pub async fn copy_basic_attributes(&self, other: &FileItem) {
        let mut guard = self.inner.write().await;
        guard.item.attributes = other.attributes;
        guard.item.creation_time = other.creation_time;
        guard.item.last_access_time = other.last_access_time;
        guard.item.modification_time = other.modification_time;
        guard.item.file_size = other.file_size;
    }

    pub async fn set_virtual_directory(&self, dir: PathBuf) {
        self.inner.write().await.virtual_directory = dir;
    }

    pub async fn set_attributes(&self, attrs: crate::attrs::FileAttributes) {
        self.inner.write().await.item.attributes = attrs;
    }

    pub async fn set_times(
        &self,
        creation: Option<std::time::SystemTime>,
        access: Option<std::time::SystemTime>,
        modification: Option<std::time::SystemTime>,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(t) = creation {
            guard.item.creation_time = t;
        }
        if let Some(t) = access {
            guard.item.last_access_time = t;
        }
        if let Some(t) = modification {
            guard.item.modification_time = t;
        }
    }

    pub async fn set_file_size(&self, size: u64) {
        self.inner.write().await.item.file_size = Some(size);
    }

    pub async fn child_count(&self) -> usize {
        self.inner.read().await.children.len()
    }
}

/// The merged tree (§3, §4.1, §4.2). Owns an arena of nodes; each node's
/// content lives behind its own lock so holding a node reference never
/// requires holding the arena lock.
pub struct Tree {
    root: NodeId,
    nodes: StdRwLock<Vec<Option<Arc<Node>>>>,
    next_id: AtomicU32,
}

impl Tree {
    pub(crate) fn empty(root_item: FileItem) -> Self {
        let root = Node {
            id: NodeId(0),
            parent: None,
            inner: RwLock::new(NodeInner {
                item: root_item,
                name_lower: String::new(),
                virtual_directory: PathBuf::new(),
                children: IndexMap::new(),
            }),
        };
        Tree {
            root: NodeId(0),
            nodes: StdRwLock::new(vec![Some(Arc::new(root))]),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().expect("arena lock poisoned").get(id.0 as usize).and_then(|s| s.clone())
    }

    fn alloc_with_parent(&self, parent: NodeId, inner: NodeInner) -> Arc<Node> {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let node = Arc::new(Node { id, parent: Some(parent), inner: RwLock::new(inner) });
        let mut nodes = self.nodes.write().expect("arena lock poisoned");
        if nodes.len() <= id.0 as usize {
            nodes.resize(id.0 as usize + 1, None);
        }
        nodes[id.0 as usize] = Some(node.clone());
        node
    }

    fn free(&self, id: NodeId) {
        if let Some(slot) = self.nodes.write().expect("arena lock poisoned").get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    /// Case-insensitive path walk (§4.2 `navigateToAny`). Returns the
    /// deepest matched node and its parent; when `vpath` is the root,
    /// `(Some(root), None)` is returned.
    pub async fn navigate_to_any(&self, vpath: &str) -> (Option<Arc<Node>>, Option<Arc<Node>>) {
        let components = path::split_components(vpath);
        let root = self.get(self.root).expect("root always present");
        if components.is_empty() {
            return (Some(root), None);
        }
        let mut parent: Option<Arc<Node>> = None;
        let mut current = root;
        for (i, comp) in components.iter().enumerate() {
            let key = path::casefold(comp);
            match self.find_child(&current, &key).await {
                Some(child) => {
                    parent = Some(current.clone());
                    current = child;
                }
                None => {
                    if i == components.len() - 1 {
                        return (None, Some(current));
                    }
                    return (None, None);
                }
            }
        }
        (Some(current), parent)
    }

    /// As [`Tree::navigate_to_any`], but returns `None` if the matched node
    /// is not a directory (§4.2 `navigateToFolder`).
    pub async fn navigate_to_folder(&self, vpath: &str) -> Option<Arc<Node>> {
        let (node, _) = self.navigate_to_any(vpath).await;
        match node {
            Some(n) if n.is_directory().await => Some(n),
            _ => None,
        }
    }

    async fn find_child(&self, node: &Arc<Node>, casefolded_name: &str) -> Option<Arc<Node>> {
        let id = {
            let inner = node.inner.read().await;
            inner.children.get(&CaseFoldKey(casefolded_name.to_string())).copied()
        };
        id.and_then(|id| self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::FileAttributes;
    use std::time::SystemTime;

    fn dummy_item(name: &str, is_dir: bool) -> FileItem {
        FileItem {
            name: name.to_string(),
            short_name: None,
            attributes: if is_dir { FileAttributes::DIRECTORY } else { FileAttributes::NORMAL },
            creation_time: SystemTime::now(),
            last_access_time: SystemTime::now(),
            modification_time: SystemTime::now(),
            file_size: if is_dir { None } else { Some(0) },
            source: PathBuf::from("/layer"),
        }
    }

    #[tokio::test]
    async fn navigate_to_root_returns_root_with_no_parent() {
        let tree = Tree::empty(FileItem::synthesize_root(std::path::Path::new("/w")));
        let (node, parent) = tree.navigate_to_any("\\").await;
        assert!(node.is_some());
        assert!(parent.is_none());
    }

    #[tokio::test]
    async fn add_child_then_navigate_case_insensitively() {
        let tree = Tree::empty(FileItem::synthesize_root(std::path::Path::new("/w")));
        let root = tree.get(tree.root_id()).unwrap();
        root.add_child(&tree, dummy_item("Readme.txt", false), PathBuf::from("/w")).await.unwrap();

        let (node, parent) = tree.navigate_to_any("\\README.TXT").await;
        assert!(node.is_some());
        assert!(parent.is_some());
        assert_eq!(node.unwrap().name().await, "Readme.txt");
    }

    #[tokio::test]
    async fn add_child_rejects_case_insensitive_collision() {
        let tree = Tree::empty(FileItem::synthesize_root(std::path::Path::new("/w")));
        let root = tree.get(tree.root_id()).unwrap();
        root.add_child(&tree, dummy_item("a.txt", false), PathBuf::from("/w")).await.unwrap();
        let result = root.add_child(&tree, dummy_item("A.TXT", false), PathBuf::from("/w")).await;
        assert_eq!(result.unwrap_err(), NtStatus::AlreadyExists);
    }

    #[tokio::test]
    async fn remove_this_child_detaches_from_parent() {
        let tree = Tree::empty(FileItem::synthesize_root(std::path::Path::new("/w")));
        let root = tree.get(tree.root_id()).unwrap();
        let child = root.add_child(&tree, dummy_item("a.txt", false), PathBuf::from("/w")).await.unwrap();
        child.remove_this_child(&tree).await.unwrap();
        let (node, _) = tree.navigate_to_any("\\a.txt").await;
        assert!(node.is_none());
        assert_eq!(root.child_count().await, 0);
    }
}
