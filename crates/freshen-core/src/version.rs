use semver::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Same,
    Newer,
    Older,
    /// Versions differ but at least one side is not semver.
    Different,
}

impl VersionRelation {
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::Same)
    }
}

/// Trims whitespace and a single leading `v`, so `v1.2.0` and `1.2.0` compare equal.
pub fn normalize_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

/// Relation of `latest` to `installed`. Any difference counts as stale; the semver
/// classification only informs logging.
pub fn compare_versions(installed: &str, latest: &str) -> VersionRelation {
    let installed = normalize_version(installed);
    let latest = normalize_version(latest);
    if installed == latest {
        return VersionRelation::Same;
    }

    match (Version::parse(installed), Version::parse(latest)) {
        (Ok(installed), Ok(latest)) if latest > installed => VersionRelation::Newer,
        (Ok(installed), Ok(latest)) if latest < installed => VersionRelation::Older,
        _ => VersionRelation::Different,
    }
}
