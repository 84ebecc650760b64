//! Volume information (C8 sibling surface): free/total space queried
//! against the write target, the one path on this mount guaranteed to sit
//! on a real, writable filesystem. Uses `fs2` rather than hand-rolling a
//! platform-specific statvfs call.

use std::path::Path;

use crate::error::{FsResult, NtStatus};
use crate::mount::Overlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl Overlay {
    pub async fn get_volume_info(&self) -> FsResult<VolumeInfo> {
        let write_target = self.write_target.clone();
        tokio::task::spawn_blocking(move || query_volume_info(&write_target))
            .await
            .map_err(|_| NtStatus::InternalError)?
    }
}

fn query_volume_info(path: &Path) -> FsResult<VolumeInfo> {
    let total = fs2::total_space(path).map_err(NtStatus::from)?;
    let free = fs2::free_space(path).map_err(NtStatus::from)?;
    Ok(VolumeInfo { total_bytes: total, free_bytes: free })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::ServiceFlags;
    use crate::config::OverlayConfig;
    use crate::mount::Service;
    use tempfile::tempdir;

    #[tokio::test]
    #[serial_test::serial]
    async fn volume_info_reports_nonzero_totals() {
        let w = tempdir().unwrap();
        let config = OverlayConfig {
            virtual_folders: vec![w.path().to_path_buf()],
            write_target: w.path().to_path_buf(),
            mount_point: "M:".into(),
            flags: ServiceFlags::empty(),
            service_name: "volume".into(),
        };
        let service = Service::new().unwrap();
        let overlay = Overlay::mount(&service, config).await.unwrap();

        let info = overlay.get_volume_info().await.unwrap();
        assert!(info.total_bytes > 0);
        assert!(info.total_bytes >= info.free_bytes);
    }
}
