use serde::{Deserialize, Serialize};

use crate::ArchiveType;

/// The latest published release as reported by a release source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub version: String,
    pub archive_locator: String,
    pub archive_type: ArchiveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ReleaseDescriptor {
    pub fn new(
        version: impl Into<String>,
        archive_locator: impl Into<String>,
        archive_type: ArchiveType,
    ) -> Self {
        Self {
            version: version.into(),
            archive_locator: archive_locator.into(),
            archive_type,
            expected_size: None,
            sha256: None,
        }
    }
}
