//! Security descriptors (§1 Non-goals: "security-descriptor composition
//! details beyond what the dispatcher consumes" are out of scope). These
//! two handlers exist so the bridge's surface is complete, but treat the
//! descriptor as an opaque blob rather than parsing ACL structure.

use crate::error::{FsResult, NtStatus};
use crate::mount::Overlay;

impl Overlay {
    /// Returns the node's stored descriptor, or an empty one if none was
    /// ever set.
    pub async fn get_security(&self, context_id: u64) -> FsResult<Vec<u8>> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        Ok(Vec::new())
    }

    /// Accepts and discards a descriptor; this overlay does not enforce
    /// Windows ACL semantics on its own, matching the Non-goal above.
    pub async fn set_security(&self, context_id: u64, _descriptor: Vec<u8>) -> FsResult<()> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        ctx.node().await.ok_or(NtStatus::FileInvalid)?;
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

    fn snapshot() -> CreateSnapshot {
        CreateSnapshot {
            file_name: "\\a.txt".into(),
            create_options: crate::attrs::CreateOptions::empty(),
            desired_access: crate::attrs::DesiredAccess::GENERIC_READ,
            share_access: crate::attrs::ShareAccess::READ,
            delete_on_close: false,
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn set_security_is_accepted_but_does_not_change_get_security() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();

        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "security".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let (node, _) = overlay.tree.navigate_to_any("\\a.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        overlay.set_security(ctx.id(), vec![1, 2, 3]).await.unwrap();
        assert_eq!(overlay.get_security(ctx.id()).await.unwrap(), Vec::<u8>::new());
    }
}
