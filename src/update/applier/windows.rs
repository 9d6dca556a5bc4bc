//! Windows finishing step for an applied update
//!
//! Windows lets a running image be renamed but not overwritten or deleted,
//! which is why the previous executable is moved aside rather than removed.
//! It is deleted by `cleanup_backup` on the following start.

use crate::update::error::Result;
use std::path::Path;

pub(super) fn prepare_executable(path: &Path) -> Result<()> {
    // Clear a read-only attribute copied from the staged file
    let mut permissions = std::fs::metadata(path)?.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions)?;
    }
    Ok(())
}
