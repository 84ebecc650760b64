//! Read/Write (§4.4): dispatches to the async or sync I/O path depending on
//! `ServiceFlags::ASYNC_IO`, and includes the mandated temporary-handle path
//! for I/O arriving after Cleanup but before Close (§9 Open Question,
//! resolved: a temporary handle is opened against the node's real path
//! rather than reusing or resurrecting the closed OS handle).

use tracing::{debug, warn};

use crate::error::{FsResult, NtStatus};
use crate::event::{ReadEvent, WriteEvent};
use crate::mount::Overlay;

impl Overlay {
    pub async fn read(&self, evt: ReadEvent) -> FsResult<Vec<u8>> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        let (closed, cleaned_up) = ctx.flags().await;
        if closed {
            return Err(NtStatus::FileClosed);
        }
        if cleaned_up {
            return self.read_via_temporary_handle(&ctx, evt).await;
        }
        if self.io.is_async_enabled() {
            let file = ctx.take_file_handle().await?;
            let (file, result) = self.io.read_async(file, evt.offset, evt.length).await;
            ctx.restore_file_handle(file).await;
            result
        } else {
            ctx.read_through(&self.io, evt.offset, evt.length).await
        }
    }

    pub async fn write(&self, evt: WriteEvent) -> FsResult<usize> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        let (closed, cleaned_up) = ctx.flags().await;
        if closed {
            return Err(NtStatus::FileClosed);
        }
        if cleaned_up {
            return self.write_via_temporary_handle(&ctx, evt).await;
        }
        if self.io.is_async_enabled() {
            let file = ctx.take_file_handle().await?;
            let (file, result) = self.io.write_async(file, evt.offset, evt.data).await;
            ctx.restore_file_handle(file).await;
            result
        } else {
            ctx.write_through(&self.io, evt.offset, &evt.data).await
        }
    }

    async fn read_via_temporary_handle(
        &self,
        ctx: &std::sync::Arc<crate::context::FileContext>,
        evt: ReadEvent,
    ) -> FsResult<Vec<u8>> {
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;
        if node.is_directory().await {
            return Err(NtStatus::FileIsADirectory);
        }
        let path = node.full_path().await;
        debug!(path = %path.display(), "read_write: late read via temporary handle");
        let mut file = tokio::fs::File::open(&path).await.map_err(NtStatus::from)?;
        self.io.read_sync(&mut file, evt.offset, evt.length).await
    }

    async fn write_via_temporary_handle(
        &self,
        ctx: &std::sync::Arc<crate::context::FileContext>,
        evt: WriteEvent,
    ) -> FsResult<usize> {
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;
        if node.is_directory().await {
            return Err(NtStatus::FileIsADirectory);
        }
        let path = node.full_path().await;
        if !path.starts_with(&self.write_target) {
            warn!(path = %path.display(), "read_write: late write target outside write layer");
            return Err(NtStatus::AccessDenied);
        }
        debug!(path = %path.display(), "read_write: late write via temporary handle");
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(NtStatus::from)?;
        let n = self.io.write_sync(&mut file, evt.offset, &evt.data).await?;
        let size = file.metadata().await.map_err(NtStatus::from)?.len();
        node.set_file_size(size).await;
        Ok(n)
    }
}
