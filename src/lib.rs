//! Userspace overlay (union) filesystem core: a merged virtual directory
//! tree over an ordered list of read-only layers plus one writable target,
//! exposed as an async library a kernel bridge (Dokan, FUSE, or a test
//! harness) drives through [`dispatcher::RequestHandlers`].
//!
//! A thin module root: all substantial logic lives in its own module, and
//! nothing is exported but the types a caller actually needs to mount and
//! drive an overlay.

pub mod attrs;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod impersonation;
pub mod io;
pub mod item;
pub mod mount;
pub mod ops;
pub mod path;
pub mod tree;

pub use config::{ConfigError, OverlayConfig};
pub use dispatcher::RequestHandlers;
pub use error::{FsResult, NtStatus};
pub use mount::{Overlay, Service};
