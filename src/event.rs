//! Event records (C13) the kernel bridge is modeled as delivering (§6).
//! Kept separate from any wire/codec concern — the bridge itself is an
//! external collaborator this crate does not implement.

use crate::attrs::{CreateDisposition, CreateOptions, DesiredAccess, FileAttributes, ShareAccess};

/// Parameters of a Create (open-or-create) request (§4.3).
#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub file_name: String,
    pub create_options: CreateOptions,
    pub create_disposition: CreateDisposition,
    pub desired_access: DesiredAccess,
    pub share_access: ShareAccess,
    pub file_attributes: FileAttributes,
    /// Hint from the bridge about whether the caller expects a directory;
    /// reconciled against the VDT by the dispatcher (§4.3 step 2).
    pub is_directory_hint: bool,
}

/// Read request (§4.4).
#[derive(Debug, Clone, Copy)]
pub struct ReadEvent {
    pub context_id: u64,
    pub offset: u64,
    pub length: u32,
}

/// Write request (§4.4).
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub context_id: u64,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Rename/move request (§4.5).
#[derive(Debug, Clone)]
pub struct RenameEvent {
    pub context_id: u64,
    pub new_name: String,
    pub replace_if_exists: bool,
}

/// Find-files request, with an optional wildcard pattern (§4.7).
#[derive(Debug, Clone)]
pub struct FindFilesEvent {
    pub context_id: u64,
    pub pattern: Option<String>,
}

/// Cleanup/Close lifecycle events (§4.9); carry only the context id because
/// all other state is already bound to the context.
#[derive(Debug, Clone, Copy)]
pub struct CleanupEvent {
    pub context_id: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CloseEvent {
    pub context_id: u64,
}

/// Delete-on-close intent set on a context (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct SetDeleteOnCloseEvent {
    pub context_id: u64,
    pub delete_on_close: bool,
}
