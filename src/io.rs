//! I/O manager (C6): sync and async read/write primitives, completion
//! demux, timeouts.

use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::attrs::ServiceFlags;
use crate::error::{FsResult, NtStatus};

/// Default bound on a single real-FS call, mirroring "requests are bounded
/// by the kernel bridge's operation timeout" (§5).
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Sync and async read/write primitives over real file handles (§2 C6).
pub struct IoManager {
    flags: ServiceFlags,
    timeout: Duration,
    next_op_id: AtomicU64,
}

impl IoManager {
    pub fn new(flags: ServiceFlags) -> Self {
        Self { flags, timeout: DEFAULT_IO_TIMEOUT, next_op_id: AtomicU64::new(1) }
    }

    pub fn with_timeout(flags: ServiceFlags, timeout: Duration) -> Self {
        Self { flags, timeout, next_op_id: AtomicU64::new(1) }
    }

    pub fn is_async_enabled(&self) -> bool {
        self.flags.contains(ServiceFlags::ASYNC_IO)
    }

    async fn bounded<F, T>(&self, fut: F) -> FsResult<T>
    where
        F: std::future::Future<Output = std::io::Result<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(NtStatus::from(e)),
            Err(_) => {
                warn!("io manager: operation exceeded timeout");
                Err(NtStatus::Io(std::io::ErrorKind::TimedOut))
            }
        }
    }

    /// Synchronous read path, used when async I/O is not configured, or for
    /// the temporary-handle late-I/O path (§4.4).
    pub async fn read_sync(&self, handle: &mut File, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        self.bounded(async {
            handle.seek(SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; len as usize];
            let n = handle.read(&mut buf).await?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    /// Synchronous write path.
    pub async fn write_sync(&self, handle: &mut File, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.bounded(async {
            handle.seek(SeekFrom::Start(offset)).await?;
            handle.write_all(data).await?;
            Ok(data.len())
        })
        .await
    }

    /// Async path: the handle is moved into a spawned task that plays the
    /// role of the OS I/O-completion thread pool (§9 "completions delivered
    /// on OS-pool threads; result routed back to the waiting context"), and
    /// handed back to the caller once the operation completes.
    pub async fn read_async(&self, mut handle: File, offset: u64, len: u32) -> (File, FsResult<Vec<u8>>) {
        let op_id = self.next_op_id.fetch_add(1, Ordering::Relaxed);
        debug!(op_id, offset, len, "io manager: dispatching async read");
        let timeout = self.timeout;
        let joined = tokio::spawn(async move {
            let result = timeout_read(&mut handle, offset, len, timeout).await;
            (handle, result)
        })
        .await;
        match joined {
            Ok((handle, result)) => (handle, result),
            Err(_) => {
                // The task panicked; we cannot recover the handle, so the
                // caller must treat this context as invalid.
                (File::from_std(tempfile_placeholder()), Err(NtStatus::InternalError))
            }
        }
    }

    pub async fn write_async(&self, mut handle: File, offset: u64, data: Vec<u8>) -> (File, FsResult<usize>) {
        let op_id = self.next_op_id.fetch_add(1, Ordering::Relaxed);
        debug!(op_id, offset, len = data.len(), "io manager: dispatching async write");
        let timeout = self.timeout;
        let joined = tokio::spawn(async move {
            let result = timeout_write(&mut handle, offset, &data, timeout).await;
            (handle, result)
        })
        .await;
        match joined {
            Ok((handle, result)) => (handle, result),
            Err(_) => (File::from_std(tempfile_placeholder()), Err(NtStatus::InternalError)),
        }
    }
}

async fn timeout_read(handle: &mut File, offset: u64, len: u32, bound: Duration) -> FsResult<Vec<u8>> {
    match timeout(bound, async {
        handle.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        let n = handle.read(&mut buf).await?;
        buf.truncate(n);
        std::io::Result::Ok(buf)
    })
    .await
    {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(NtStatus::from(e)),
        Err(_) => Err(NtStatus::Io(std::io::ErrorKind::TimedOut)),
    }
}

async fn timeout_write(handle: &mut File, offset: u64, data: &[u8], bound: Duration) -> FsResult<usize> {
    match timeout(bound, async {
        handle.seek(SeekFrom::Start(offset)).await?;
        handle.write_all(data).await?;
        std::io::Result::Ok(data.len())
    })
    .await
    {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(NtStatus::from(e)),
        Err(_) => Err(NtStatus::Io(std::io::ErrorKind::TimedOut)),
    }
}

/// Placeholder handle used only to satisfy the return type on the
/// unreachable-in-practice panic path above; never read from or written to.
fn tempfile_placeholder() -> std::fs::File {
    // A spawned I/O task panicking is itself a bug report; this sentinel
    // only needs to satisfy the return type so the caller can observe
    // `NtStatus::InternalError` instead of the process aborting.
    #[cfg(windows)]
    let null_path = "NUL";
    #[cfg(not(windows))]
    let null_path = "/dev/null";
    std::fs::OpenOptions::new()
        .read(true)
        .open(null_path)
        .expect("platform must provide a null device")
}
