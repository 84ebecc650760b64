//! Windows-style bitsets consumed by the dispatcher and operation handlers
//! (C2), built with `bitflags!` the way hardware/file-attribute register
//! bits are modeled elsewhere in this dependency stack.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FileAttributes: u32 {
        const NORMAL        = 0x0000_0080;
        const READONLY      = 0x0000_0001;
        const HIDDEN        = 0x0000_0002;
        const SYSTEM        = 0x0000_0004;
        const DIRECTORY     = 0x0000_0010;
        const ARCHIVE       = 0x0000_0020;
        const REPARSE_POINT = 0x0000_0400;
        const INVALID       = 0x8000_0000;
    }
}

impl Default for FileAttributes {
    fn default() -> Self {
        FileAttributes::NORMAL
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE     = 0x0000_0001;
        const NON_DIRECTORY_FILE = 0x0000_0040;
        const DELETE_ON_CLOSE    = 0x0000_1000;
        const SEQUENTIAL_ONLY    = 0x0000_0004;
        const RANDOM_ACCESS      = 0x0000_0800;
        const BACKUP_SEMANTICS   = 0x0000_4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DesiredAccess: u32 {
        const GENERIC_READ    = 0x8000_0000;
        const GENERIC_WRITE   = 0x4000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const DELETE          = 0x0001_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareAccess: u32 {
        const READ   = 0x0000_0001;
        const WRITE  = 0x0000_0002;
        const DELETE = 0x0000_0004;
    }
}

bitflags! {
    /// The `flags` bitset of the §6 configuration surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ServiceFlags: u32 {
        const ASYNC_IO                     = 0b001;
        const IMPERSONATE_CALLER_USER      = 0b010;
        const ALLOW_DELETE_ENUMERATION_OPEN = 0b100;
    }
}

impl Default for ServiceFlags {
    fn default() -> Self {
        ServiceFlags::empty()
    }
}

/// Disposition values from `CreateFile`'s `dwCreationDisposition` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    CreateNew,
    CreateAlways,
    OpenExisting,
    OpenAlways,
    TruncateExisting,
}
