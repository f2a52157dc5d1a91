use super::*;

#[test]
fn parse_full_config() {
    let content = r#"
[release]
kind = "feed"
feed = "releases.json"

[app]
command = ["python3", "web.py", "--port", "8000"]
relaunch = ["./freshen", "launch"]

[state]
file = "session.txt"

[update]
stuck_after_secs = 120

[[requirements]]
name = "pillow"
check = ["python3", "-c", "import PIL"]
install = ["python3", "-m", "pip", "install", "Pillow"]
"#;

    let config = LauncherConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(config.release.kind, ReleaseSourceKind::Feed);
    assert_eq!(
        config.release.feed.as_deref(),
        Some(std::path::Path::new("releases.json"))
    );
    assert_eq!(config.app.command.program(), "python3");
    assert_eq!(config.app.command.args(), ["web.py", "--port", "8000"]);
    assert_eq!(
        config.app.relaunch.as_ref().map(ToString::to_string).as_deref(),
        Some("./freshen launch")
    );
    assert_eq!(config.state.file, "session.txt");
    assert_eq!(config.state.backup_file(), "session.txt.bak");
    assert_eq!(config.update.stuck_after_secs, 120);
    assert_eq!(config.update.marker_file, "update_in_progress.flag");
    assert_eq!(config.requirements.len(), 1);
    assert!(config.requirements[0].install.is_some());
}

#[test]
fn empty_config_uses_defaults() {
    let config = LauncherConfig::from_toml_str("").expect("empty config should parse");
    assert_eq!(config, LauncherConfig::default());
    assert_eq!(config.state.file, "room.txt");
    assert_eq!(config.update.version_file, "version.txt");
    assert_eq!(config.update.staging_dir, "temp_update");
}

#[test]
fn config_rejects_empty_command() {
    let err = LauncherConfig::from_toml_str("[app]\ncommand = []\n")
        .expect_err("empty command must fail");
    assert!(format!("{err:#}").contains("command must name a program"));
}

#[test]
fn config_rejects_nested_reserved_names() {
    let err = LauncherConfig::from_toml_str("[update]\nstaging_dir = \"tmp/update\"\n")
        .expect_err("nested staging dir must fail");
    assert!(format!("{err:#}").contains("update.staging_dir"));
}

#[test]
fn config_rejects_colliding_reserved_names() {
    let err = LauncherConfig::from_toml_str("[update]\nmarker_file = \"room.txt.bak\"\n")
        .expect_err("marker colliding with state backup must fail");
    assert!(format!("{err:#}").contains("collides"));
}

#[test]
fn config_rejects_state_file_named_like_config() {
    let err = LauncherConfig::from_toml_str("[state]\nfile = \"freshen.toml\"\n")
        .expect_err("state file shadowing the config must fail");
    assert!(format!("{err:#}").contains("collides"));
}

#[test]
fn config_rejects_feed_kind_without_path() {
    let err = LauncherConfig::from_toml_str("[release]\nkind = \"feed\"\n")
        .expect_err("feed without path must fail");
    assert!(err.to_string().contains("release.feed"));
}

#[test]
fn config_rejects_duplicate_requirements() {
    let content = r#"
[[requirements]]
name = "pillow"
check = ["true"]

[[requirements]]
name = "pillow"
check = ["true"]
"#;
    let err = LauncherConfig::from_toml_str(content).expect_err("duplicates must fail");
    assert!(err.to_string().contains("duplicate requirement"));
}

#[test]
fn load_missing_config_falls_back_to_defaults() {
    let dir = std::env::temp_dir().join(format!(
        "freshen-core-missing-config-{}",
        std::process::id()
    ));
    let config = LauncherConfig::load(&dir).expect("missing config must not fail");
    assert_eq!(config, LauncherConfig::default());
}

#[test]
fn archive_type_parse_accepts_aliases() {
    assert_eq!(ArchiveType::parse("ZIP"), Some(ArchiveType::Zip));
    assert_eq!(ArchiveType::parse(" tgz "), Some(ArchiveType::TarGz));
    assert_eq!(ArchiveType::parse("tarball"), Some(ArchiveType::TarGz));
    assert_eq!(ArchiveType::parse("msi"), None);
}

#[test]
fn archive_type_infers_from_url() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/app-1.2.0.tar.gz?download=1"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/app.zip#frag"),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://api.github.com/repos/o/r/zipball/v1.2.0"),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://api.github.com/repos/o/r/tarball/v1.2.0"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(ArchiveType::infer_from_url("https://example.test/app"), None);
}

#[test]
fn versions_compare_after_normalization() {
    assert_eq!(compare_versions("1.0.0", " v1.0.0\n"), VersionRelation::Same);
    assert_eq!(compare_versions("1.0.0", "1.2.0"), VersionRelation::Newer);
    assert_eq!(compare_versions("1.2.0", "1.0.0"), VersionRelation::Older);
    assert_eq!(compare_versions("nightly-1", "nightly-2"), VersionRelation::Different);
    assert!(compare_versions("1.2.0", "1.0.0").is_stale());
    assert!(!compare_versions("v2", "2").is_stale());
}

#[test]
fn release_descriptor_json_omits_absent_digest() {
    let descriptor = ReleaseDescriptor::new(
        "1.2.0",
        "https://example.test/app.tar.gz",
        ArchiveType::TarGz,
    );
    let raw = toml::to_string(&descriptor).expect("descriptor must serialize");
    assert!(raw.contains("archive_type = \"tar.gz\""));
    assert!(!raw.contains("sha256"));
}
