use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use freshen_core::ArchiveType;
use tar::Archive;

pub(crate) fn extract_archive(archive_path: &Path, dst: &Path, archive_type: ArchiveType) -> Result<()> {
    match archive_type {
        ArchiveType::TarGz => extract_tar_gz(archive_path, dst),
        ArchiveType::Zip => extract_zip(archive_path, dst),
    }
}

/// Maps an archive entry name onto a path relative to the extraction root. Absolute
/// names, drive prefixes and `..` segments are rejected; `None` means the entry names
/// the root itself.
pub(crate) fn validate_entry_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let text = part.to_string_lossy();
                // Zip names may carry Windows separators.
                for piece in text.split('\\') {
                    if piece == ".." {
                        return Err(anyhow!("archive entry escapes target: {}", path.display()));
                    }
                    if piece.is_empty() || piece == "." {
                        continue;
                    }
                    if piece.len() >= 2 && piece.as_bytes()[1] == b':' && out.as_os_str().is_empty() {
                        return Err(anyhow!("archive entry has a drive prefix: {}", path.display()));
                    }
                    out.push(piece);
                }
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("archive entry escapes target: {}", path.display()));
            }
        }
    }

    if out.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(out))
}

fn validate_link_target(entry_path: &Path, target: &Path) -> Result<()> {
    if target.is_absolute() || target.components().any(|c| matches!(c, Component::Prefix(_))) {
        return Err(anyhow!(
            "archive link {} points outside target: {}",
            entry_path.display(),
            target.display()
        ));
    }

    let mut depth: isize = entry_path.components().count() as isize - 1;
    for component in target.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return Err(anyhow!(
                "archive link {} points outside target: {}",
                entry_path.display(),
                target.display()
            ));
        }
    }
    Ok(())
}

fn open_tar_gz(archive_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open {}", archive_path.display()))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Validates every entry first, then unpacks, so a hostile entry is rejected before
/// anything reaches the disk.
fn extract_tar_gz(archive_path: &Path, dst: &Path) -> Result<()> {
    let mut listing = open_tar_gz(archive_path)?;
    let mut entry_count = 0_usize;
    for entry in listing
        .entries()
        .with_context(|| format!("failed to read tar entries: {}", archive_path.display()))?
    {
        let entry = entry.context("corrupt tar entry")?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            continue;
        }
        let path = entry.path().context("tar entry has an invalid path")?.into_owned();
        let Some(rel) = validate_entry_path(&path)? else {
            continue;
        };
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .context("tar link entry has an invalid target")?
                .ok_or_else(|| anyhow!("tar link entry has no target: {}", path.display()))?;
            if entry_type.is_hard_link() {
                validate_entry_path(&target)?;
            } else {
                validate_link_target(&rel, &target)?;
            }
        }
        entry_count += 1;
    }
    if entry_count == 0 {
        return Err(anyhow!("archive is empty: {}", archive_path.display()));
    }

    let mut archive = open_tar_gz(archive_path)?;
    archive.set_preserve_permissions(true);
    for entry in archive
        .entries()
        .with_context(|| format!("failed to read tar entries: {}", archive_path.display()))?
    {
        let mut entry = entry.context("corrupt tar entry")?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            continue;
        }
        let path = entry.path().context("tar entry has an invalid path")?.into_owned();
        let unpacked = entry
            .unpack_in(dst)
            .with_context(|| format!("failed to unpack {}", path.display()))?;
        if !unpacked {
            return Err(anyhow!("archive entry escapes target: {}", path.display()));
        }
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    let names = list_zip_entries(archive_path)?;
    if names.is_empty() {
        return Err(anyhow!("archive is empty: {}", archive_path.display()));
    }
    for name in &names {
        validate_entry_path(Path::new(name))?;
    }

    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote(archive_path),
            escape_ps_single_quote(dst)
        ));
        if run_command(&mut command, "failed to extract zip archive with powershell").is_ok() {
            return Ok(());
        }
    }

    let mut unzip_command = Command::new("unzip");
    unzip_command.arg("-q").arg("-o").arg(archive_path).arg("-d").arg(dst);
    if run_command(&mut unzip_command, "failed to extract zip archive with unzip").is_ok() {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract zip archive with tar fallback",
    )
}

fn list_zip_entries(archive_path: &Path) -> Result<Vec<String>> {
    let listing = Command::new("unzip").arg("-Z1").arg(archive_path).output();
    let stdout = match listing {
        Ok(output) if output.status.success() => output.stdout,
        _ => {
            let output = Command::new("tar")
                .arg("-tf")
                .arg(archive_path)
                .output()
                .context("failed to list zip archive: neither unzip nor tar is available")?;
            if !output.status.success() {
                return Err(anyhow!(
                    "failed to list zip archive: status={} stderr='{}'",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            output.stdout
        }
    };

    Ok(parse_entry_listing(&String::from_utf8_lossy(&stdout)))
}

pub(crate) fn parse_entry_listing(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

/// Picks the staged root: a lone top-level directory is unwrapped, anything else is
/// used as extracted.
pub fn normalize_staged_root(extracted: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(extracted).with_context(|| format!("failed to read {}", extracted.display()))?
    {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        entries.push((entry.path(), is_dir));
    }

    match entries.as_slice() {
        [] => Err(anyhow!(
            "extraction produced no files: {}",
            extracted.display()
        )),
        [(only, true)] => Ok(only.clone()),
        _ => Ok(extracted.to_path_buf()),
    }
}

fn escape_ps_single_quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}
