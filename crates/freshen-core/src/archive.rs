use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveType {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "zip" | "zipball" => Some(Self::Zip),
            "tar.gz" | "tgz" | "tarball" => Some(Self::TarGz),
            _ => None,
        }
    }

    /// Infers the archive type from a locator's file name, ignoring query and fragment.
    pub fn infer_from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let without_query = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);

        if without_query.ends_with(".zip") {
            return Some(Self::Zip);
        }
        if without_query.ends_with(".tar.gz") || without_query.ends_with(".tgz") {
            return Some(Self::TarGz);
        }

        // GitHub source archives: .../zipball/<ref> and .../tarball/<ref>
        let mut segments = without_query.rsplit('/');
        let _reference = segments.next();
        match segments.next() {
            Some("zipball") => Some(Self::Zip),
            Some("tarball") => Some(Self::TarGz),
            _ => None,
        }
    }
}
