mod archive;
mod command;
mod config;
mod release;
mod version;

pub use archive::ArchiveType;
pub use command::CommandSpec;
pub use config::{
    AppConfig, LauncherConfig, ReleaseConfig, ReleaseSourceKind, RequirementConfig, StateConfig,
    UpdateConfig, CONFIG_FILE_NAME,
};
pub use release::ReleaseDescriptor;
pub use version::{compare_versions, normalize_version, VersionRelation};

#[cfg(test)]
mod tests;
