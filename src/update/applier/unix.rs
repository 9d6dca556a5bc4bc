//! Unix finishing step for an applied update

use crate::update::error::Result;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Downloaded files carry no mode bits; make the new binary executable
pub(super) fn prepare_executable(path: &Path) -> Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}
