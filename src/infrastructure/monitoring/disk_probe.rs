use crate::domain::ports::DiskSpaceProbe;
use anyhow::{Context, Result, anyhow};
use std::path::Path;
use sysinfo::Disks;

/// Free space of the mounted volume holding a path, via `sysinfo`.
pub struct SystemDiskProbe;

impl DiskSpaceProbe for SystemDiskProbe {
    fn available_bytes(&self, path: &Path) -> Result<u64> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Cannot resolve {}", path.display()))?;
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that prefixes the path.
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .ok_or_else(|| anyhow!("No mounted volume found for {}", path.display()))
    }
}
