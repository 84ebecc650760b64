//! Mount/unmount lifecycle and service registry (C9, §5).
//!
//! An explicitly-constructed process-wide registry guards the single global
//! service instance against a second construction, separate from the mount
//! table itself (an insertion-ordered sequence of the filesystems currently
//! attached to that one service).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use moka::sync::Cache;
use tracing::{info, warn};

use crate::attrs::ServiceFlags;
use crate::config::OverlayConfig;
use crate::context::ContextPool;
use crate::error::{FsResult, NtStatus};
use crate::impersonation::{Impersonator, NoopImpersonator};
use crate::io::IoManager;
use crate::tree::builder::build_tree;
use crate::tree::Tree;

static SERVICE_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

/// Process-wide mount table: an insertion-ordered sequence of currently
/// mounted service names, re-registration of an already-present name is
/// idempotent (moves it to the end rather than duplicating it).
#[derive(Default)]
struct MountTable {
    names: Vec<String>,
}

impl MountTable {
    fn register(&mut self, name: &str) {
        self.names.retain(|n| n != name);
        self.names.push(name.to_string());
    }

    fn unregister(&mut self, name: &str) {
        self.names.retain(|n| n != name);
    }
}

/// The single process-wide service instance (§5, §9). Constructing a second
/// one is a programmer error and is rejected rather than silently
/// tolerated.
pub struct Service {
    table: Mutex<MountTable>,
}

impl Service {
    pub fn new() -> FsResult<Arc<Service>> {
        if SERVICE_CONSTRUCTED.swap(true, Ordering::SeqCst) {
            warn!("service: a second instance was attempted; rejecting");
            return Err(NtStatus::InternalError);
        }
        Ok(Arc::new(Service { table: Mutex::new(MountTable::default()) }))
    }

    pub fn mounted_names(&self) -> Vec<String> {
        self.table.lock().expect("mount table poisoned").names.clone()
    }
}

#[cfg(test)]
impl Drop for Service {
    fn drop(&mut self) {
        SERVICE_CONSTRUCTED.store(false, Ordering::SeqCst);
    }
}

/// One mounted overlay filesystem: a built VDT plus the handler
/// dependencies the dispatcher and operation handlers close over.
pub struct Overlay {
    pub(crate) service_name: String,
    pub(crate) tree: Tree,
    pub(crate) write_target: PathBuf,
    pub(crate) layers: Vec<PathBuf>,
    pub(crate) contexts: ContextPool,
    pub(crate) io: IoManager,
    pub(crate) impersonator: Box<dyn Impersonator>,
    /// The §6 `flags` bitset this mount was configured with, kept around so
    /// handlers (e.g. the dispatcher's impersonation gate) can check it
    /// without threading it through every call.
    pub(crate) flags: ServiceFlags,
    /// Compiled `glob::Pattern`s keyed by their source string, so a hot
    /// `FindFilesWithPattern` loop does not recompile the same pattern on
    /// every call.
    pub(crate) pattern_cache: Cache<String, Arc<glob::Pattern>>,
}

impl Overlay {
    /// Builds the VDT from `config` and registers it with `service` (§4.1,
    /// §5). Idempotent re-mount under the same service name is allowed; the
    /// caller is responsible for not mounting the same name twice
    /// concurrently. Uses [`NoopImpersonator`]; call
    /// [`Overlay::mount_with_impersonator`] to install a real one.
    pub async fn mount(service: &Service, config: OverlayConfig) -> FsResult<Arc<Overlay>> {
        Self::mount_with_impersonator(service, config, Box::new(NoopImpersonator)).await
    }

    /// As [`Overlay::mount`], but lets the caller supply the [`Impersonator`]
    /// invoked when `ServiceFlags::IMPERSONATE_CALLER_USER` is set (§4.3.3),
    /// rather than always getting the no-op default.
    pub async fn mount_with_impersonator(
        service: &Service,
        config: OverlayConfig,
        impersonator: Box<dyn Impersonator>,
    ) -> FsResult<Arc<Overlay>> {
        config.validate().map_err(|_| NtStatus::ObjectNameInvalid)?;
        let tree = build_tree(&config.virtual_folders, &config.write_target).await?;
        let overlay = Arc::new(Overlay {
            service_name: config.service_name.clone(),
            tree,
            write_target: config.write_target.clone(),
            layers: config.virtual_folders.clone(),
            contexts: ContextPool::new(),
            io: IoManager::new(config.flags),
            impersonator,
            flags: config.flags,
            pattern_cache: Cache::new(256),
        });
        service.table.lock().expect("mount table poisoned").register(&config.service_name);
        info!(service = %config.service_name, layers = overlay.layers.len(), "overlay: mounted");
        Ok(overlay)
    }

    /// Detaches this overlay from the service's mount table (§5 "VDT
    /// discarded on unmount"). The in-memory tree itself is freed when the
    /// last `Arc<Overlay>` is dropped.
    pub fn unmount(&self, service: &Service) {
        service.table.lock().expect("mount table poisoned").unregister(&self.service_name);
        info!(service = %self.service_name, "overlay: unmounted");
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn layers(&self) -> &[PathBuf] {
        &self.layers
    }

    pub fn write_target(&self) -> &PathBuf {
        &self.write_target
    }
}
