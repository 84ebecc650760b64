//! Dispatcher (C7): the central request translator for create/open (§4.3).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tracing::{debug, info};

use crate::attrs::{CreateDisposition, CreateOptions, DesiredAccess, FileAttributes, ServiceFlags, ShareAccess};
use crate::context::{CreateSnapshot, FileContext, OpenHandle};
use crate::error::{FsResult, NtStatus};
use crate::event::{CleanupEvent, CloseEvent, CreateEvent, FindFilesEvent, ReadEvent, RenameEvent, SetDeleteOnCloseEvent, WriteEvent};
use crate::item::FileItem;
use crate::mount::Overlay;
use crate::path;
use crate::tree::Node;

/// Handler table (one async method per event kind): a table bound at
/// construction rather than an inheritance hierarchy over event kinds. Only
/// the overlay table is implemented here; a mirror-mode table is out of
/// scope (§1 Non-goals) but could implement the same trait.
#[async_trait]
pub trait RequestHandlers: Send + Sync {
    async fn create_or_open(&self, evt: CreateEvent) -> FsResult<(Arc<FileContext>, NtStatus)>;
    async fn read(&self, evt: ReadEvent) -> FsResult<Vec<u8>>;
    async fn write(&self, evt: WriteEvent) -> FsResult<usize>;
    async fn rename(&self, evt: RenameEvent) -> FsResult<()>;
    async fn can_delete(&self, context_id: u64) -> FsResult<()>;
    async fn set_delete_on_close(&self, evt: SetDeleteOnCloseEvent) -> FsResult<()>;
    async fn find_files(&self, evt: FindFilesEvent) -> FsResult<Vec<FileItem>>;
    async fn cleanup(&self, evt: CleanupEvent) -> FsResult<()>;
    async fn close(&self, evt: CloseEvent) -> FsResult<()>;
}

/// Builds the real-FS `OpenOptions` implied by a disposition/access pair.
fn open_options_for(disposition: CreateDisposition, desired_access: DesiredAccess) -> OpenOptions {
    let wants_write = desired_access.intersects(DesiredAccess::GENERIC_WRITE | DesiredAccess::DELETE);
    let mut opts = OpenOptions::new();
    opts.read(true);
    match disposition {
        CreateDisposition::CreateNew => {
            opts.write(true).create_new(true);
        }
        CreateDisposition::CreateAlways => {
            opts.write(true).create(true).truncate(true);
        }
        CreateDisposition::OpenExisting => {
            if wants_write {
                opts.write(true);
            }
        }
        CreateDisposition::OpenAlways => {
            opts.write(true).create(true);
        }
        CreateDisposition::TruncateExisting => {
            opts.write(true).truncate(true);
        }
    }
    opts
}

fn is_write_producing(disposition: CreateDisposition, desired_access: DesiredAccess) -> bool {
    matches!(
        disposition,
        CreateDisposition::CreateNew
            | CreateDisposition::CreateAlways
            | CreateDisposition::OpenAlways
            | CreateDisposition::TruncateExisting
    ) || desired_access.contains(DesiredAccess::GENERIC_WRITE)
}

/// Recursively materializes `dir` inside the write target (§4.3.1
/// "copy-up of directory skeleton").
async fn copy_up_directory_skeleton(dir: &Path) -> FsResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

impl Overlay {
    /// §4.3: lookup, directory-hint reconciliation, then branch.
    pub async fn dispatch_create(&self, mut evt: CreateEvent) -> FsResult<(Arc<FileContext>, NtStatus)> {
        // §4.3.3: impersonation only begins when the caller opted in via
        // ServiceFlags; otherwise the hook (and its trait) stay inert.
        let guard = self.flags.contains(ServiceFlags::IMPERSONATE_CALLER_USER).then(|| self.impersonator.begin());

        let (target, parent) = self.tree.navigate_to_any(&evt.file_name).await;

        if let Some(t) = &target {
            if t.is_directory().await {
                if evt.create_options.contains(CreateOptions::NON_DIRECTORY_FILE) {
                    return Err(NtStatus::FileIsADirectory);
                }
                evt.is_directory_hint = true;
                evt.share_access |= ShareAccess::READ;
            }
        } else if evt.create_options.contains(CreateOptions::DIRECTORY_FILE) {
            evt.is_directory_hint = true;
            evt.share_access |= ShareAccess::READ;
        }

        let result = if evt.is_directory_hint {
            self.dispatch_directory_branch(evt, target, parent).await
        } else {
            self.dispatch_file_branch(evt, target, parent).await
        };

        drop(guard);
        result
    }

    /// §4.3.1.
    async fn dispatch_file_branch(
        &self,
        mut evt: CreateEvent,
        target: Option<Arc<Node>>,
        parent: Option<Arc<Node>>,
    ) -> FsResult<(Arc<FileContext>, NtStatus)> {
        let disposition = evt.create_disposition;

        if target.is_none()
            && matches!(disposition, CreateDisposition::OpenExisting | CreateDisposition::TruncateExisting)
        {
            return Err(NtStatus::ObjectPathNotFound);
        }

        if let Some(t) = &target {
            let attrs = t.item_snapshot().await.attributes;
            let overwriting = matches!(disposition, CreateDisposition::CreateAlways | CreateDisposition::TruncateExisting);
            if overwriting
                && ((attrs.contains(FileAttributes::HIDDEN) && !evt.file_attributes.contains(FileAttributes::HIDDEN))
                    || (attrs.contains(FileAttributes::SYSTEM) && !evt.file_attributes.contains(FileAttributes::SYSTEM)))
            {
                return Err(NtStatus::AccessDenied);
            }
        }

        if matches!(disposition, CreateDisposition::TruncateExisting) {
            evt.desired_access |= DesiredAccess::GENERIC_WRITE;
        }

        let (real_path, virtual_directory, existed_before) = match &target {
            Some(t) => (t.full_path().await, t.virtual_directory().await, true),
            None => {
                let Some(parent_node) = &parent else {
                    return Err(NtStatus::ObjectPathNotFound);
                };
                let name = path::last_component(&evt.file_name)?;
                let relative = parent_node.relative_path(&self.tree).await.join(&name);
                (self.write_target.join(&relative), self.write_target.clone(), false)
            }
        };

        let opts = open_options_for(disposition, evt.desired_access);
        let write_producing = is_write_producing(disposition, evt.desired_access);

        let open_result = opts.open(&real_path).await;
        let file = match open_result {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && write_producing => {
                let dir = real_path.parent().ok_or(NtStatus::ObjectPathNotFound)?;
                copy_up_directory_skeleton(dir).await?;
                info!(path = %real_path.display(), "dispatcher: copy-up of directory skeleton");
                opts.open(&real_path).await.map_err(NtStatus::from)?
            }
            Err(e) => return Err(NtStatus::from(e)),
        };

        let node = match &target {
            Some(t) => {
                if matches!(disposition, CreateDisposition::TruncateExisting) {
                    let mut merged = t.item_snapshot().await.attributes;
                    merged |= evt.file_attributes;
                    t.set_attributes(merged).await;
                    t.set_file_size(0).await;
                }
                t.clone()
            }
            None => {
                let parent_node = parent.as_ref().ok_or(NtStatus::ObjectPathNotFound)?;
                let meta = file.metadata().await.map_err(NtStatus::from)?;
                let name = path::last_component(&evt.file_name)?;
                let item = FileItem::from_metadata(&virtual_directory, &name, &meta);
                parent_node.add_child(&self.tree, item, virtual_directory).await?
            }
        };

        let status = if existed_before
            && matches!(disposition, CreateDisposition::OpenAlways | CreateDisposition::CreateAlways)
        {
            NtStatus::ObjectNameCollision
        } else {
            NtStatus::Success
        };

        let ctx = self
            .contexts
            .acquire(
                OpenHandle::File(file),
                CreateSnapshot {
                    file_name: evt.file_name.clone(),
                    create_options: evt.create_options,
                    desired_access: evt.desired_access,
                    share_access: evt.share_access,
                    delete_on_close: evt.create_options.contains(CreateOptions::DELETE_ON_CLOSE),
                },
            )
            .await;
        ctx.bind_node(node.id()).await;
        debug!(path = %evt.file_name, status = %status, "dispatcher: file branch complete");
        Ok((ctx, status))
    }

    /// §4.3.2.
    async fn dispatch_directory_branch(
        &self,
        evt: CreateEvent,
        target: Option<Arc<Node>>,
        parent: Option<Arc<Node>>,
    ) -> FsResult<(Arc<FileContext>, NtStatus)> {
        let disposition = evt.create_disposition;
        let existed_before = target.is_some();

        let node = match &target {
            Some(t) => {
                if !t.is_directory().await {
                    return Err(NtStatus::NotADirectory);
                }
                t.clone()
            }
            None => {
                if !matches!(disposition, CreateDisposition::CreateNew | CreateDisposition::OpenAlways) {
                    return Err(NtStatus::ObjectPathNotFound);
                }
                let parent_node = parent.as_ref().ok_or(NtStatus::ObjectPathNotFound)?;
                let name = path::last_component(&evt.file_name)?;
                let relative = parent_node.relative_path(&self.tree).await.join(&name);
                let real_path = self.write_target.join(&relative);
                match tokio::fs::create_dir(&real_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        if matches!(disposition, CreateDisposition::CreateNew) {
                            return Err(NtStatus::AlreadyExists);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        copy_up_directory_skeleton(real_path.parent().ok_or(NtStatus::ObjectPathNotFound)?).await?;
                        tokio::fs::create_dir(&real_path).await.map_err(NtStatus::from)?;
                    }
                    Err(e) => return Err(NtStatus::from(e)),
                }
                let meta = tokio::fs::metadata(&real_path).await.map_err(NtStatus::from)?;
                let item = FileItem::from_metadata(&self.write_target, &name, &meta);
                parent_node.add_child(&self.tree, item, self.write_target.clone()).await?
            }
        };

        let status = if existed_before && matches!(disposition, CreateDisposition::OpenAlways) {
            NtStatus::ObjectNameCollision
        } else {
            NtStatus::Success
        };

        let ctx = self
            .contexts
            .acquire(
                OpenHandle::Directory,
                CreateSnapshot {
                    file_name: evt.file_name.clone(),
                    create_options: evt.create_options | CreateOptions::BACKUP_SEMANTICS,
                    desired_access: evt.desired_access,
                    share_access: evt.share_access,
                    delete_on_close: evt.create_options.contains(CreateOptions::DELETE_ON_CLOSE),
                },
            )
            .await;
        ctx.bind_node(node.id()).await;
        debug!(path = %evt.file_name, status = %status, "dispatcher: directory branch complete");
        Ok((ctx, status))
    }
}

/// Wires the handler table (§9 "virtual dispatch of event handlers") onto
/// [`Overlay`]: each method delegates to the `impl Overlay` block in the
/// module that owns that operation (this one for create/open, the `ops::*`
/// modules for everything past it).
#[async_trait]
impl RequestHandlers for Overlay {
    async fn create_or_open(&self, evt: CreateEvent) -> FsResult<(Arc<FileContext>, NtStatus)> {
        self.dispatch_create(evt).await
    }

    async fn read(&self, evt: ReadEvent) -> FsResult<Vec<u8>> {
        Overlay::read(self, evt).await
    }

    async fn write(&self, evt: WriteEvent) -> FsResult<usize> {
        Overlay::write(self, evt).await
    }

    async fn rename(&self, evt: RenameEvent) -> FsResult<()> {
        Overlay::rename(self, evt).await
    }

    async fn can_delete(&self, context_id: u64) -> FsResult<()> {
        Overlay::can_delete(self, context_id).await
    }

    async fn set_delete_on_close(&self, evt: SetDeleteOnCloseEvent) -> FsResult<()> {
        Overlay::set_delete_on_close(self, evt).await
    }

    async fn find_files(&self, evt: FindFilesEvent) -> FsResult<Vec<FileItem>> {
        Overlay::find_files(self, evt).await
    }

    async fn cleanup(&self, evt: CleanupEvent) -> FsResult<()> {
        Overlay::cleanup(self, evt).await
    }

    async fn close(&self, evt: CloseEvent) -> FsResult<()> {
        Overlay::close(self, evt).await
    }
}
