//! Cleanup/Close state machine (§4.9): `SetDeleteOnClose`, Cleanup, and
//! Close, plus returning a closed context to the pool.

use tracing::debug;

use crate::error::{FsResult, NtStatus};
use crate::event::{CleanupEvent, CloseEvent, SetDeleteOnCloseEvent};
use crate::mount::Overlay;

impl Overlay {
    pub async fn set_delete_on_close(&self, evt: SetDeleteOnCloseEvent) -> FsResult<()> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        ctx.set_delete_on_close(evt.delete_on_close).await;
        Ok(())
    }

    /// Kernel Cleanup (§4.9 `Open -> CleanedUp`): closes the OS handle and
    /// performs the deferred delete here, matching real driver behavior
    /// where Cleanup is where the filesystem actually removes the object.
    pub async fn cleanup(&self, evt: CleanupEvent) -> FsResult<()> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        self.delete_if_flagged(&ctx).await?;
        ctx.mark_cleaned_up().await;
        debug!(context_id = evt.context_id, "cleanup: context marked cleaned up");
        Ok(())
    }

    /// Kernel Close (§4.9 `CleanedUp -> Closed` or `Open -> Closed` directly
    /// when no Cleanup preceded it). Deletion only runs here when Cleanup
    /// never ran — otherwise the node is already detached and a second
    /// `remove_this_child` would fail.
    pub async fn close(&self, evt: CloseEvent) -> FsResult<()> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        let (_, cleaned_up) = ctx.flags().await;
        if !cleaned_up {
            self.delete_if_flagged(&ctx).await?;
        }
        ctx.mark_closed().await;
        self.contexts.release(ctx);
        debug!(context_id = evt.context_id, "close: context released to pool");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::ServiceFlags;
    use crate::config::OverlayConfig;
    use crate::context::{CreateSnapshot, OpenHandle};
    use crate::mount::Service;
    use tempfile::tempdir;

    fn snapshot(delete_on_close: bool) -> CreateSnapshot {
        CreateSnapshot {
            file_name: "\\scratch.txt".into(),
            create_options: crate::attrs::CreateOptions::empty(),
            desired_access: crate::attrs::DesiredAccess::GENERIC_WRITE,
            share_access: crate::attrs::ShareAccess::READ,
            delete_on_close,
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn cleanup_deletes_and_close_does_not_double_delete() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("scratch.txt"), "x").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "lifecycle-cleanup".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\scratch.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot(true)).await;
        ctx.bind_node(node.unwrap().id()).await;

        overlay.cleanup(CleanupEvent { context_id: ctx.id() }).await.unwrap();
        assert!(!w.path().join("scratch.txt").exists());

        overlay.close(CloseEvent { context_id: ctx.id() }).await.unwrap();
        let (closed, _) = ctx.flags().await;
        assert!(closed);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn close_without_cleanup_still_deletes() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("scratch.txt"), "x").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "lifecycle-close".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\scratch.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot(true)).await;
        ctx.bind_node(node.unwrap().id()).await;

        overlay.close(CloseEvent { context_id: ctx.id() }).await.unwrap();
        assert!(!w.path().join("scratch.txt").exists());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn close_releases_context_back_to_the_pool() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "lifecycle-pool".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\a.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot(false)).await;
        let id = ctx.id();
        ctx.bind_node(node.unwrap().id()).await;

        overlay.close(CloseEvent { context_id: id }).await.unwrap();
        assert!(overlay.contexts.get(id).is_none());
    }
}
