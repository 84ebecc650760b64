//! FileContext table (C5): per-open-handle state and its pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_queue::SegQueue;
use tokio::fs::File;
use tokio::sync::RwLock;

use crate::attrs::{CreateOptions, DesiredAccess, ShareAccess};
use crate::error::{FsResult, NtStatus};
use crate::io::IoManager;
use crate::tree::NodeId;

/// Real OS handle backing a [`FileContext`]. Directories have no
/// `tokio::fs::File`-shaped handle on this platform, so they are
/// represented distinctly rather than faked with a dummy file.
pub enum OpenHandle {
    File(File),
    Directory,
}

/// Snapshot of the original create-event parameters, kept for the lifetime
/// of the context (§3 `FileContext` "event snapshot").
#[derive(Debug, Clone)]
pub struct CreateSnapshot {
    pub file_name: String,
    pub create_options: CreateOptions,
    pub desired_access: DesiredAccess,
    pub share_access: ShareAccess,
    pub delete_on_close: bool,
}

struct ContextState {
    node: Option<NodeId>,
    closed: bool,
    cleaned_up: bool,
    delete_on_close: bool,
}

/// Per-open-handle state (§3, §4.9). The `closed`/`cleaned_up`/`node` triple
/// lives behind one `RwLock` so read/write handlers can "observe both flags
/// atomically via a small helper that locks once and returns both values"
/// (§4.4), rather than racing two independent atomics.
pub struct FileContext {
    id: u64,
    handle: RwLock<Option<OpenHandle>>,
    event: RwLock<CreateSnapshot>,
    state: RwLock<ContextState>,
}

impl FileContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn event(&self) -> CreateSnapshot {
        self.event.read().await.clone()
    }

    /// Binds this context to a node right after a successful create/open
    /// (§4.9 `Fresh -> Open`).
    pub async fn bind_node(&self, node: NodeId) {
        self.state.write().await.node = Some(node);
    }

    pub async fn node(&self) -> Option<NodeId> {
        self.state.read().await.node
    }

    /// Returns `(closed, cleaned_up)` under a single lock acquisition, as
    /// §4.4 requires.
    pub async fn flags(&self) -> (bool, bool) {
        let guard = self.state.read().await;
        (guard.closed, guard.cleaned_up)
    }

    pub async fn delete_on_close(&self) -> bool {
        self.state.read().await.delete_on_close
    }

    pub async fn set_delete_on_close(&self, value: bool) {
        self.state.write().await.delete_on_close = value;
    }

    /// Kernel Cleanup: closes the OS handle, marks `cleanedUp` (§4.9).
    pub async fn mark_cleaned_up(&self) -> Option<OpenHandle> {
        self.state.write().await.cleaned_up = true;
        self.handle.write().await.take()
    }

    /// Kernel Close: marks `closed`, unbinds the node so a stale context
    /// cannot be mistaken for a live one (§4.9 `CleanedUp -> Closed`).
    pub async fn mark_closed(&self) {
        let mut guard = self.state.write().await;
        guard.closed = true;
        guard.node = None;
    }

    pub async fn with_handle<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut OpenHandle) -> R,
    {
        let mut guard = self.handle.write().await;
        guard.as_mut().map(f)
    }

    /// Reads through the context's own OS handle, under its handle lock
    /// (§4.4). Returns [`NtStatus::FileClosed`] if Cleanup already took the
    /// handle away; callers on the late-I/O path (§4.4 temporary-handle
    /// rule) must detect that themselves via [`FileContext::flags`] first
    /// and fall back to a fresh handle opened against the node's real path.
    pub async fn read_through(&self, io: &IoManager, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let mut guard = self.handle.write().await;
        match guard.as_mut() {
            Some(OpenHandle::File(file)) => io.read_sync(file, offset, len).await,
            Some(OpenHandle::Directory) => Err(NtStatus::FileIsADirectory),
            None => Err(NtStatus::FileClosed),
        }
    }

    /// Queries metadata straight off the context's own OS handle, for
    /// `GetInfo`'s preferred path (§4.8). Returns `None` for a directory
    /// handle or once Cleanup has taken the handle away.
    pub async fn handle_metadata(&self) -> Option<std::fs::Metadata> {
        let mut guard = self.handle.write().await;
        match guard.as_mut() {
            Some(OpenHandle::File(file)) => file.metadata().await.ok(),
            _ => None,
        }
    }

    pub async fn write_through(&self, io: &IoManager, offset: u64, data: &[u8]) -> FsResult<usize> {
        let mut guard = self.handle.write().await;
        match guard.as_mut() {
            Some(OpenHandle::File(file)) => io.write_sync(file, offset, data).await,
            Some(OpenHandle::Directory) => Err(NtStatus::FileIsADirectory),
            None => Err(NtStatus::FileClosed),
        }
    }

    /// Takes the context's `File` out for the async I/O path (§4.4), leaving
    /// the handle slot empty for the duration of the op so a concurrent
    /// request on the same context sees it as unavailable rather than racing
    /// the same `File` from two tasks. Restore with [`FileContext::restore_file_handle`]
    /// once the spawned task hands the handle back.
    pub async fn take_file_handle(&self) -> FsResult<File> {
        let mut guard = self.handle.write().await;
        match guard.take() {
            Some(OpenHandle::File(file)) => Ok(file),
            Some(other @ OpenHandle::Directory) => {
                *guard = Some(other);
                Err(NtStatus::FileIsADirectory)
            }
            None => Err(NtStatus::FileClosed),
        }
    }

    pub async fn restore_file_handle(&self, file: File) {
        *self.handle.write().await = Some(OpenHandle::File(file));
    }
}

/// Thread-safe free list backing context reuse, realized with
/// `crossbeam_queue::SegQueue`.
pub struct ContextPool {
    free: SegQueue<Arc<FileContext>>,
    /// Live contexts addressable by the opaque id the bridge hands back on
    /// every subsequent request for the same handle.
    active: Mutex<HashMap<u64, Arc<FileContext>>>,
    next_id: AtomicU64,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPool {
    pub fn new() -> Self {
        Self { free: SegQueue::new(), active: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Allocates a context for a freshly successful create/open (§4.9
    /// `Fresh`), reusing a pooled instance's allocation when one is
    /// available instead of allocating a new `Arc`.
    pub async fn acquire(&self, handle: OpenHandle, event: CreateSnapshot) -> Arc<FileContext> {
        let ctx = if let Some(reused) = self.free.pop() {
            *reused.handle.write().await = Some(handle);
            *reused.event.write().await = event.clone();
            *reused.state.write().await = ContextState {
                node: None,
                closed: false,
                cleaned_up: false,
                delete_on_close: event.delete_on_close,
            };
            reused
        } else {
            Arc::new(FileContext {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                handle: RwLock::new(Some(handle)),
                state: RwLock::new(ContextState {
                    node: None,
                    closed: false,
                    cleaned_up: false,
                    delete_on_close: event.delete_on_close,
                }),
                event: RwLock::new(event),
            })
        };
        self.active.lock().expect("context table poisoned").insert(ctx.id(), ctx.clone());
        ctx
    }

    /// Looks up a live context by the id handed back by the bridge.
    pub fn get(&self, id: u64) -> Option<Arc<FileContext>> {
        self.active.lock().expect("context table poisoned").get(&id).cloned()
    }

    /// Returns a closed context to the pool (§4.9 `Closed -> Pooled`),
    /// removing it from the live table so a stale id cannot resolve to it.
    pub fn release(&self, ctx: Arc<FileContext>) {
        self.active.lock().expect("context table poisoned").remove(&ctx.id());
        self.free.push(ctx);
    }

    /// True if some other live context bound to `node_id` carries
    /// delete-on-close (§6 `ALLOW_DELETE_ENUMERATION_OPEN`): by default an
    /// enumeration open is refused against a node pending deletion; the flag
    /// lets a caller permit it anyway.
    pub async fn any_pending_delete_for(&self, node_id: NodeId) -> bool {
        let snapshot: Vec<Arc<FileContext>> = self.active.lock().expect("context table poisoned").values().cloned().collect();
        for ctx in snapshot {
            if ctx.node().await == Some(node_id) && ctx.delete_on_close().await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CreateSnapshot {
        CreateSnapshot {
            file_name: "\\a.txt".into(),
            create_options: CreateOptions::empty(),
            desired_access: DesiredAccess::GENERIC_READ,
            share_access: ShareAccess::READ,
            delete_on_close: false,
        }
    }

    #[tokio::test]
    async fn fresh_context_starts_open_and_unflagged() {
        let pool = ContextPool::new();
        let ctx = pool.acquire(OpenHandle::Directory, snapshot()).await;
        let (closed, cleaned_up) = ctx.flags().await;
        assert!(!closed);
        assert!(!cleaned_up);
    }

    #[tokio::test]
    async fn cleanup_then_close_transitions_flags() {
        let pool = ContextPool::new();
        let ctx = pool.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.mark_cleaned_up().await;
        let (closed, cleaned_up) = ctx.flags().await;
        assert!(!closed);
        assert!(cleaned_up);
        ctx.mark_closed().await;
        let (closed, cleaned_up) = ctx.flags().await;
        assert!(closed);
        assert!(cleaned_up);
        assert!(ctx.node().await.is_none());
    }

    #[tokio::test]
    async fn released_context_is_reused_on_next_acquire() {
        let pool = ContextPool::new();
        let first = pool.acquire(OpenHandle::Directory, snapshot()).await;
        let first_id = first.id();
        ctx_close(&first).await;
        pool.release(first);

        let second = pool.acquire(OpenHandle::Directory, snapshot()).await;
        assert_eq!(second.id(), first_id);
        let (closed, cleaned_up) = second.flags().await;
        assert!(!closed);
        assert!(!cleaned_up);
    }

    async fn ctx_close(ctx: &Arc<FileContext>) {
        ctx.mark_cleaned_up().await;
        ctx.mark_closed().await;
    }
}
