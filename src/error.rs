//! Status taxonomy returned by every handler: a flat, `Copy`-able enum
//! covering the handler status space, plus a bridge from `std::io::Error`
//! for real-filesystem failures.

use std::fmt;
use std::io;

/// Convenience alias used by every handler in this crate.
pub type FsResult<T> = Result<T, NtStatus>;

/// Status codes returned across the kernel-bridge boundary (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtStatus {
    Success,
    /// Success-with-note: `OpenAlways`/`CreateAlways` found an existing object.
    ObjectNameCollision,
    FileClosed,
    FileInvalid,
    FileIsADirectory,
    NotADirectory,
    ObjectPathNotFound,
    ObjectNameInvalid,
    AccessDenied,
    CannotDelete,
    DirectoryNotEmpty,
    BufferOverflow,
    AlreadyExists,
    /// Invariant violated at runtime (e.g. new node created with no parent).
    InternalError,
    /// Pass-through family: any real-FS failure not covered above.
    Io(io::ErrorKind),
}

impl NtStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, NtStatus::Success | NtStatus::ObjectNameCollision)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtStatus::Success => write!(f, "success"),
            NtStatus::ObjectNameCollision => write!(f, "object name collision"),
            NtStatus::FileClosed => write!(f, "file closed"),
            NtStatus::FileInvalid => write!(f, "file invalid"),
            NtStatus::FileIsADirectory => write!(f, "file is a directory"),
            NtStatus::NotADirectory => write!(f, "not a directory"),
            NtStatus::ObjectPathNotFound => write!(f, "object path not found"),
            NtStatus::ObjectNameInvalid => write!(f, "object name invalid"),
            NtStatus::AccessDenied => write!(f, "access denied"),
            NtStatus::CannotDelete => write!(f, "cannot delete"),
            NtStatus::DirectoryNotEmpty => write!(f, "directory not empty"),
            NtStatus::BufferOverflow => write!(f, "buffer overflow"),
            NtStatus::AlreadyExists => write!(f, "already exists"),
            NtStatus::InternalError => write!(f, "internal error"),
            NtStatus::Io(kind) => write!(f, "io error: {kind:?}"),
        }
    }
}

impl std::error::Error for NtStatus {}

impl From<io::Error> for NtStatus {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => NtStatus::ObjectPathNotFound,
            io::ErrorKind::PermissionDenied => NtStatus::AccessDenied,
            io::ErrorKind::AlreadyExists => NtStatus::AlreadyExists,
            kind => NtStatus::Io(kind),
        }
    }
}
