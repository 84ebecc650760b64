//! Rename / move (§4.5): overlay replace, refuse-replace, pure rename, and
//! cross-directory move, discriminated by whether a node already occupies
//! the destination path and whether source and destination share a parent.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{FsResult, NtStatus};
use crate::event::RenameEvent;
use crate::item::FileItem;
use crate::mount::Overlay;
use crate::path;
use crate::tree::Node;

impl Overlay {
    pub async fn rename(&self, evt: RenameEvent) -> FsResult<()> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        let src_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let src = self.tree.get(src_id).ok_or(NtStatus::FileInvalid)?;

        let new_name = path::normalize(&evt.new_name);
        let last = path::last_component(&new_name)?;
        if last.is_empty() {
            return Err(NtStatus::ObjectNameInvalid);
        }

        let (dest, dest_parent) = self.tree.navigate_to_any(&new_name).await;

        if let Some(dest_node) = dest {
            if !evt.replace_if_exists {
                return Err(NtStatus::AlreadyExists);
            }
            return self.rename_replace(&src, &dest_node).await;
        }

        let Some(dest_parent) = dest_parent else {
            return Err(NtStatus::ObjectPathNotFound);
        };

        if src.parent_id() == Some(dest_parent.id()) {
            self.rename_in_place(&src, &last).await
        } else {
            self.rename_move(&src, &dest_parent, &last).await
        }
    }

    /// Overlay replace: an existing destination node, `ReplaceIfExists`.
    async fn rename_replace(&self, src: &Arc<Node>, dest: &Arc<Node>) -> FsResult<()> {
        let src_path = src.full_path().await;
        let dest_path = dest.full_path().await;
        tokio::fs::rename(&src_path, &dest_path).await.map_err(NtStatus::from)?;

        let src_item = src.item_snapshot().await;
        let src_vd = src.virtual_directory().await;
        dest.take_item(&src_item, src_vd).await;
        src.remove_this_child(&self.tree).await?;
        info!(from = %src_path.display(), to = %dest_path.display(), "rename: overlay replace");
        Ok(())
    }

    /// Pure rename: same parent, no existing destination. Renames the real
    /// file in place, wherever its owning layer happens to be.
    async fn rename_in_place(&self, src: &Arc<Node>, new_name: &str) -> FsResult<()> {
        let old_path = src.full_path().await;
        let new_path = old_path.parent().ok_or(NtStatus::ObjectPathNotFound)?.join(new_name);
        tokio::fs::rename(&old_path, &new_path).await.map_err(NtStatus::from)?;
        src.set_name(&self.tree, new_name.to_string()).await?;
        debug!(from = %old_path.display(), to = %new_path.display(), "rename: in place");
        Ok(())
    }

    /// Move: a different parent, possibly a different backing layer. The
    /// new location always lands in the write target (§3 write redirection).
    async fn rename_move(&self, src: &Arc<Node>, dest_parent: &Arc<Node>, new_name: &str) -> FsResult<()> {
        let src_path = src.full_path().await;
        let relative = dest_parent.relative_path(&self.tree).await.join(new_name);
        let new_path = self.write_target.join(&relative);
        if let Some(parent_dir) = new_path.parent() {
            tokio::fs::create_dir_all(parent_dir).await.map_err(NtStatus::from)?;
        }

        if tokio::fs::rename(&src_path, &new_path).await.is_err() {
            // Cross-device: fall back to copy + remove (directories are not
            // supported this way; §1 Non-goals excludes cross-volume
            // atomicity, so this is treated as a hard failure rather than a
            // recursive copy).
            if src.is_directory().await {
                return Err(NtStatus::Io(std::io::ErrorKind::Unsupported));
            }
            tokio::fs::copy(&src_path, &new_path).await.map_err(NtStatus::from)?;
            tokio::fs::remove_file(&src_path).await.map_err(NtStatus::from)?;
        }

        let meta = tokio::fs::metadata(&new_path).await.map_err(NtStatus::from)?;
        let item = FileItem::from_metadata(&self.write_target, new_name, &meta);
        let new_node = dest_parent.add_child(&self.tree, item, self.write_target.clone()).await?;

        let src_item = src.item_snapshot().await;
        new_node.take_item(&src_item, self.write_target.clone()).await;
        src.remove_this_child(&self.tree).await?;
        info!(from = %src_path.display(), to = %new_path.display(), "rename: cross-directory move");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::ServiceFlags;
    use crate::config::OverlayConfig;
    use crate::context::{CreateSnapshot, OpenHandle};
    use crate::event::RenameEvent;
    use crate::mount::Service;
    use tempfile::tempdir;

    fn snapshot() -> CreateSnapshot {
        CreateSnapshot {
            file_name: "\\old.txt".into(),
            create_options: crate::attrs::CreateOptions::empty(),
            desired_access: crate::attrs::DesiredAccess::GENERIC_READ,
            share_access: crate::attrs::ShareAccess::READ,
            delete_on_close: false,
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn rename_replace_across_same_parent() {
        let b = tempdir().unwrap();
        std::fs::write(b.path().join("old.txt"), "X").unwrap();
        std::fs::write(b.path().join("new.txt"), "Y").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![b.path().to_path_buf()],
            write_target: b.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "rename-replace".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\old.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        overlay
            .rename(RenameEvent { context_id: ctx.id(), new_name: "\\new.txt".into(), replace_if_exists: true })
            .await
            .unwrap();

        let (old, _) = overlay.tree.navigate_to_any("\\old.txt").await;
        assert!(old.is_none());
        let (new_node, _) = overlay.tree.navigate_to_any("\\new.txt").await;
        assert!(new_node.is_some());
        assert_eq!(std::fs::read_to_string(b.path().join("new.txt")).unwrap(), "X");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn rename_without_replace_refuses_existing_destination() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("old.txt"), "X").unwrap();
        std::fs::write(w.path().join("new.txt"), "Y").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "rename-refuse".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\old.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        let err = overlay
            .rename(RenameEvent { context_id: ctx.id(), new_name: "\\new.txt".into(), replace_if_exists: false })
            .await
            .unwrap_err();
        assert_eq!(err, NtStatus::AlreadyExists);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn empty_new_name_is_invalid() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("old.txt"), "X").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "rename-empty".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\old.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        let err = overlay
            .rename(RenameEvent { context_id: ctx.id(), new_name: "\\".into(), replace_if_exists: false })
            .await
            .unwrap_err();
        assert_eq!(err, NtStatus::ObjectNameInvalid);
    }
}
