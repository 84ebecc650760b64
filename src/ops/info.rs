//! GetInfo and its sibling metadata setters (§4.8).

use std::time::SystemTime;

use tracing::debug;

use crate::attrs::FileAttributes;
use crate::error::{FsResult, NtStatus};
use crate::item::FileItem;
use crate::mount::Overlay;

impl Overlay {
    /// Preference order: the open handle's live metadata first, falling
    /// back to the FileNode snapshot (§4.8).
    pub async fn get_info(&self, context_id: u64) -> FsResult<FileItem> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;
        let mut item = node.item_snapshot().await;

        if let Some(meta) = ctx.handle_metadata().await {
            item.file_size = Some(meta.len());
            if let Ok(t) = meta.modified() {
                item.modification_time = t;
            }
            if let Ok(t) = meta.accessed() {
                item.last_access_time = t;
            }
        }
        Ok(item)
    }

    /// `SetFileAttributes`: merges the requested bits into both the node
    /// snapshot and the real file, under the node's write lock. Not subject
    /// to copy-up (§4.8): metadata changes are serviced in place even when
    /// the node's backing layer is read-only, since every layer on this
    /// platform is writable to the process — only actual data writes force
    /// a copy into the write target.
    pub async fn set_attributes(&self, context_id: u64, attributes: FileAttributes) -> FsResult<()> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;

        let path = node.full_path().await;
        let mut perms = tokio::fs::metadata(&path).await.map_err(NtStatus::from)?.permissions();
        perms.set_readonly(attributes.contains(FileAttributes::READONLY));
        tokio::fs::set_permissions(&path, perms).await.map_err(NtStatus::from)?;

        node.set_attributes(attributes).await;
        debug!(path = %path.display(), ?attributes, "set_attributes: applied");
        Ok(())
    }

    /// `SetFileTime`: node-snapshot only (§9 open question: no `filetime`-
    /// equivalent crate sits in this stack, so the real file's on-disk
    /// timestamps are not touched; the in-memory snapshot is authoritative
    /// for subsequent `GetInfo` calls on this mount).
    pub async fn set_times(
        &self,
        context_id: u64,
        creation: Option<SystemTime>,
        access: Option<SystemTime>,
        modification: Option<SystemTime>,
    ) -> FsResult<()> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;
        node.set_times(creation, access, modification).await;
        Ok(())
    }
}
