use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::CommandSpec;

pub const CONFIG_FILE_NAME: &str = "freshen.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    pub release: ReleaseConfig,
    pub app: AppConfig,
    pub state: StateConfig,
    pub update: UpdateConfig,
    pub requirements: Vec<RequirementConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSourceKind {
    #[default]
    Github,
    Feed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    pub kind: ReleaseSourceKind,
    pub owner: String,
    pub repo: String,
    pub api_base: String,
    pub asset: Option<String>,
    pub feed: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            kind: ReleaseSourceKind::Github,
            owner: "RyeHands".to_string(),
            repo: "pinots-display".to_string(),
            api_base: "https://api.github.com".to_string(),
            asset: None,
            feed: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub command: CommandSpec,
    pub relaunch: Option<CommandSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command: CommandSpec::new("python3", ["web.py"]),
            relaunch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StateConfig {
    pub file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file: "room.txt".to_string(),
        }
    }
}

impl StateConfig {
    pub fn backup_file(&self) -> String {
        format!("{}.bak", self.file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdateConfig {
    pub version_file: String,
    pub marker_file: String,
    pub staging_dir: String,
    pub swap_script: String,
    pub parent_exit_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub stuck_after_secs: u64,
    pub log_dir: Option<PathBuf>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_file: "version.txt".to_string(),
            marker_file: "update_in_progress.flag".to_string(),
            staging_dir: "temp_update".to_string(),
            swap_script: ".freshen-swap".to_string(),
            parent_exit_timeout_secs: 10,
            settle_delay_ms: 1000,
            stuck_after_secs: 600,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementConfig {
    pub name: String,
    pub check: CommandSpec,
    pub install: Option<CommandSpec>,
}

impl LauncherConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse freshen config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `freshen.toml` from the installation directory, falling back to defaults
    /// when the file does not exist.
    pub fn load(install_dir: &Path) -> Result<Self> {
        let path = install_dir.join(CONFIG_FILE_NAME);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let backup = self.state.backup_file();
        let reserved = [
            ("state.file", self.state.file.as_str()),
            ("state backup", backup.as_str()),
            ("update.version_file", self.update.version_file.as_str()),
            ("update.marker_file", self.update.marker_file.as_str()),
            ("update.staging_dir", self.update.staging_dir.as_str()),
            ("update.swap_script", self.update.swap_script.as_str()),
            ("config file", CONFIG_FILE_NAME),
        ];

        let mut seen = HashSet::new();
        for (field, name) in reserved {
            validate_plain_file_name(name)
                .with_context(|| format!("invalid value for {field}: '{name}'"))?;
            if !seen.insert(name) {
                return Err(anyhow!("{field} '{name}' collides with another reserved name"));
            }
        }

        match self.release.kind {
            ReleaseSourceKind::Github => {
                if self.release.owner.trim().is_empty() || self.release.repo.trim().is_empty() {
                    return Err(anyhow!("github release source requires owner and repo"));
                }
            }
            ReleaseSourceKind::Feed => {
                if self.release.feed.is_none() {
                    return Err(anyhow!("feed release source requires release.feed"));
                }
            }
        }

        let mut requirement_names = HashSet::new();
        for requirement in &self.requirements {
            if requirement.name.trim().is_empty() {
                return Err(anyhow!("requirement name must not be empty"));
            }
            if !requirement_names.insert(requirement.name.as_str()) {
                return Err(anyhow!("duplicate requirement '{}'", requirement.name));
            }
        }

        Ok(())
    }
}

fn validate_plain_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("name must not be empty"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(anyhow!("name must be a single plain path component")),
    }
}
