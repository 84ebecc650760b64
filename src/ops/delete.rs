//! Delete / delete-on-close (§4.6): `CanDelete` is a pure check; the actual
//! removal is deferred to the Cleanup/Close lifecycle (see `ops::lifecycle`).

use std::sync::Arc;

use tracing::info;

use crate::attrs::FileAttributes;
use crate::context::FileContext;
use crate::error::{FsResult, NtStatus};
use crate::mount::Overlay;

impl Overlay {
    /// `CanDelete`: read-only files and non-empty directories refuse
    /// deletion; everything else is eligible (§4.6).
    pub async fn can_delete(&self, context_id: u64) -> FsResult<()> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;

        if node.is_directory().await {
            if node.child_count().await > 0 {
                return Err(NtStatus::DirectoryNotEmpty);
            }
        } else if node.item_snapshot().await.attributes.contains(FileAttributes::READONLY) {
            return Err(NtStatus::CannotDelete);
        }
        Ok(())
    }

    /// Performs the real deletion if `ctx` carries delete-on-close, detaching
    /// the node from the VDT on success. Called from both Cleanup and Close
    /// (§4.9); a no-op if the flag was never set or the context is already
    /// unbound.
    pub(crate) async fn delete_if_flagged(&self, ctx: &Arc<FileContext>) -> FsResult<()> {
        if !ctx.delete_on_close().await {
            return Ok(());
        }
        let Some(node_id) = ctx.node().await else {
            return Ok(());
        };
        let Some(node) = self.tree.get(node_id) else {
            return Ok(());
        };

        let path = node.full_path().await;
        let result =
            if node.is_directory().await { tokio::fs::remove_dir(&path).await } else { tokio::fs::remove_file(&path).await };

        match result {
            Ok(()) => {
                node.remove_this_child(&self.tree).await?;
                info!(path = %path.display(), "delete: removed on close");
                Ok(())
            }
            Err(e) => Err(NtStatus::from(e)),
        }
    }
}
