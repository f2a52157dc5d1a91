use std::fs;
use std::io;

use anyhow::Context;

use crate::{InstallLayout, UpdateError};

pub fn read_installed_version(layout: &InstallLayout) -> Result<String, UpdateError> {
    let path = layout.version_path();
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(raw.trim().to_string()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(UpdateError::MissingVersionFile { path })
        }
        Err(err) => Err(UpdateError::Filesystem(
            anyhow::Error::new(err).context(format!("failed to read {}", path.display())),
        )),
    }
}

/// Writes the version file through a temp sibling so readers never see a partial value.
pub fn write_installed_version(layout: &InstallLayout, version: &str) -> anyhow::Result<()> {
    let path = layout.version_path();
    let tmp = path.with_file_name(format!("{}.tmp", layout.names().version_file));
    fs::write(&tmp, format!("{}\n", version.trim()))
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}
