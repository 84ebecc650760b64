//! Enumeration (§4.7): `FindFiles`, `FindFilesWithPattern`, and `FindStreams`
//! folded into one handler keyed off `FindFilesEvent::pattern`. `find_files`
//! also gates on `ServiceFlags::ALLOW_DELETE_ENUMERATION_OPEN` (§6): a
//! directory with a pending delete-on-close refuses enumeration unless the
//! flag is set.

use std::sync::Arc;

use crate::attrs::ServiceFlags;
use crate::error::{FsResult, NtStatus};
use crate::event::FindFilesEvent;
use crate::item::FileItem;
use crate::mount::Overlay;
use crate::path;

/// One entry of a `FindStreams` result. Hosts with no alternate-data-stream
/// support only ever produce the unnamed default stream (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: String,
    pub size: u64,
}

impl Overlay {
    /// Lists a directory's children, filtered through `evt.pattern` when one
    /// is given. The pattern is lower-cased once up front and matched
    /// against each already-lower-cased child name (§4.7).
    pub async fn find_files(&self, evt: FindFilesEvent) -> FsResult<Vec<FileItem>> {
        let ctx = self.contexts.get(evt.context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;
        if !node.is_directory().await {
            return Err(NtStatus::NotADirectory);
        }

        if !self.flags.contains(ServiceFlags::ALLOW_DELETE_ENUMERATION_OPEN)
            && self.contexts.any_pending_delete_for(node_id).await
        {
            return Err(NtStatus::AccessDenied);
        }

        let matcher = match &evt.pattern {
            Some(p) => Some(self.compile_pattern(p)?),
            None => None,
        };

        let mut out = Vec::new();
        node.walk_children(&self.tree, |child| {
            out.push(child);
            true
        })
        .await;

        let mut items = Vec::with_capacity(out.len());
        for child in out {
            let item = child.item_snapshot().await;
            let matches = match &matcher {
                Some(pattern) => pattern.matches(&path::casefold(&item.name)),
                None => true,
            };
            if matches {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// `FindStreams` (§4.7): on a host with no alternate-data-stream support
    /// this always yields just the default data stream for a file and
    /// nothing for a directory. `max_count` models the kernel bridge's
    /// output buffer; exceeding it is surfaced as `BufferOverflow` rather
    /// than silently truncating.
    pub async fn find_streams(&self, context_id: u64, max_count: usize) -> FsResult<Vec<StreamInfo>> {
        let ctx = self.contexts.get(context_id).ok_or(NtStatus::FileClosed)?;
        let node_id = ctx.node().await.ok_or(NtStatus::FileInvalid)?;
        let node = self.tree.get(node_id).ok_or(NtStatus::FileInvalid)?;

        if node.is_directory().await {
            return Ok(Vec::new());
        }

        let item = node.item_snapshot().await;
        let streams = vec![StreamInfo { name: "::$DATA".to_string(), size: item.file_size.unwrap_or(0) }];
        if streams.len() > max_count {
            return Err(NtStatus::BufferOverflow);
        }
        Ok(streams)
    }

    /// Compiles `pattern` (lower-cased once) into a `glob::Pattern`, or
    /// returns the already-compiled one from the pattern cache.
    fn compile_pattern(&self, pattern: &str) -> FsResult<Arc<glob::Pattern>> {
        let key = path::casefold(pattern);
        if let Some(cached) = self.pattern_cache.get(&key) {
            return Ok(cached);
        }
        let compiled = Arc::new(glob::Pattern::new(&key).map_err(|_| NtStatus::ObjectNameInvalid)?);
        self.pattern_cache.insert(key, compiled.clone());
        Ok(compiled)
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
            file_name: "\\".into(),
            create_options: crate::attrs::CreateOptions::empty(),
            desired_access: crate::attrs::DesiredAccess::GENERIC_READ,
            share_access: crate::attrs::ShareAccess::READ,
            delete_on_close: false,
        }
    }

    async fn mount_with(w: &tempfile::TempDir) -> std::sync::Arc<Overlay> {
        mount_with_flags(w, ServiceFlags::empty()).await
    }

    async fn mount_with_flags(w: &tempfile::TempDir, flags: ServiceFlags) -> std::sync::Arc<Overlay> {
        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags,
            service_name: format!("enum-{}", w.path().display()),
        };
        let service = Service::new().unwrap();
        Overlay::mount(&service, config).await.unwrap()
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn find_files_lists_all_children_with_no_pattern() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();
        std::fs::write(w.path().join("b.log"), "y").unwrap();
        let overlay = mount_with(&w).await;

        let (root, _) = overlay.tree.navigate_to_any("\\").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(root.unwrap().id()).await;

        let items = overlay.find_files(FindFilesEvent { context_id: ctx.id(), pattern: None }).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn find_files_filters_by_pattern_case_insensitively() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();
        std::fs::write(w.path().join("b.log"), "y").unwrap();
        let overlay = mount_with(&w).await;

        let (root, _) = overlay.tree.navigate_to_any("\\").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(root.unwrap().id()).await;

        let items =
            overlay.find_files(FindFilesEvent { context_id: ctx.id(), pattern: Some("*.TXT".into()) }).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "a.txt");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn find_streams_yields_only_default_stream_for_a_file() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "hello").unwrap();
        let overlay = mount_with(&w).await;

        let (node, _) = overlay.tree.navigate_to_any("\\a.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        let streams = overlay.find_streams(ctx.id(), 8).await.unwrap();
        assert_eq!(streams, vec![StreamInfo { name: "::$DATA".into(), size: 5 }]);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn find_streams_reports_buffer_overflow_when_too_small() {
        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "hello").unwrap();
        let overlay = mount_with(&w).await;

        let (node, _) = overlay.tree.navigate_to_any("\\a.txt").await;
        let ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        ctx.bind_node(node.unwrap().id()).await;

        let err = overlay.find_streams(ctx.id(), 0).await.unwrap_err();
        assert_eq!(err, NtStatus::BufferOverflow);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn find_files_refuses_enumeration_of_a_directory_pending_delete() {
        use crate::event::SetDeleteOnCloseEvent;

        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();
        let overlay = mount_with(&w).await;

        let (root, _) = overlay.tree.navigate_to_any("\\").await;
        let root = root.unwrap();

        let delete_ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        delete_ctx.bind_node(root.id()).await;
        overlay
            .set_delete_on_close(SetDeleteOnCloseEvent { context_id: delete_ctx.id(), delete_on_close: true })
            .await
            .unwrap();

        let list_ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        list_ctx.bind_node(root.id()).await;

        let err = overlay.find_files(FindFilesEvent { context_id: list_ctx.id(), pattern: None }).await.unwrap_err();
        assert_eq!(err, NtStatus::AccessDenied);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn allow_delete_enumeration_open_permits_enumerating_a_directory_pending_delete() {
        use crate::event::SetDeleteOnCloseEvent;

        let w = tempdir().unwrap();
        std::fs::write(w.path().join("a.txt"), "x").unwrap();
        let overlay = mount_with_flags(&w, ServiceFlags::ALLOW_DELETE_ENUMERATION_OPEN).await;

        let (root, _) = overlay.tree.navigate_to_any("\\").await;
        let root = root.unwrap();

        let delete_ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        delete_ctx.bind_node(root.id()).await;
        overlay
            .set_delete_on_close(SetDeleteOnCloseEvent { context_id: delete_ctx.id(), delete_on_close: true })
            .await
            .unwrap();

        let list_ctx = overlay.contexts.acquire(OpenHandle::Directory, snapshot()).await;
        list_ctx.bind_node(root.id()).await;

        let items = overlay.find_files(FindFilesEvent { context_id: list_ctx.id(), pattern: None }).await.unwrap();
        assert_eq!(items.len(), 1);
    }
}
