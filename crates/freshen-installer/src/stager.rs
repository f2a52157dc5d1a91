use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use freshen_core::ReleaseDescriptor;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tracing::{debug, info};

use crate::extract::{extract_archive, normalize_staged_root};
use crate::fs_utils::{remove_file_if_exists, remove_path_if_exists};
use crate::StageError;

/// Receives byte counts while an archive downloads.
pub trait DownloadProgress {
    fn on_progress(&self, downloaded: u64, total: Option<u64>);
    fn on_finish(&self) {}
}

pub struct ArchiveStager<'a> {
    connect_timeout: Duration,
    progress: Option<&'a dyn DownloadProgress>,
}

impl<'a> ArchiveStager<'a> {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn DownloadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Downloads, verifies, extracts and normalizes the release inside `work_dir`,
    /// returning the staged root. The archive itself is removed once extracted.
    pub fn stage(
        &self,
        descriptor: &ReleaseDescriptor,
        work_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        fs::create_dir_all(work_dir)
            .map_err(|err| filesystem_error(err, format!("failed to create {}", work_dir.display())))?;

        let archive_path = work_dir.join(format!(
            "archive.{}",
            descriptor.archive_type.file_extension()
        ));
        self.download(descriptor, &archive_path)?;

        let extracted = work_dir.join("extracted");
        remove_path_if_exists(&extracted).map_err(StageError::Filesystem)?;
        fs::create_dir_all(&extracted).map_err(|err| {
            filesystem_error(err, format!("failed to create {}", extracted.display()))
        })?;

        debug!(archive = %archive_path.display(), "extracting release archive");
        extract_archive(&archive_path, &extracted, descriptor.archive_type).map_err(|err| {
            StageError::Extract {
                message: format!("{err:#}"),
            }
        })?;
        remove_file_if_exists(&archive_path).map_err(|err| {
            filesystem_error(err, format!("failed to remove {}", archive_path.display()))
        })?;

        let staged_root = normalize_staged_root(&extracted).map_err(|err| StageError::Extract {
            message: format!("{err:#}"),
        })?;
        info!(
            version = %descriptor.version,
            staged_root = %staged_root.display(),
            "release staged"
        );
        Ok(staged_root)
    }

    fn download(&self, descriptor: &ReleaseDescriptor, archive_path: &Path) -> Result<(), StageError> {
        let locator = descriptor.archive_locator.as_str();
        let part_path = archive_path.with_file_name(format!(
            "{}.part",
            archive_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("archive")
        ));
        let download_error = |message: String| StageError::Download {
            locator: locator.to_string(),
            message,
        };

        info!(version = %descriptor.version, locator, "downloading release archive");
        let result = self
            .fetch_to(locator, &part_path)
            .and_then(|(written, announced)| {
                verify_length(written, announced, descriptor.expected_size)
            })
            .map_err(download_error);
        if let Some(progress) = self.progress {
            progress.on_finish();
        }
        if let Err(err) = result {
            let _ = remove_file_if_exists(&part_path);
            return Err(err);
        }

        if let Some(expected) = descriptor.sha256.as_deref() {
            if let Err(err) = freshen_security::verify_sha256_file(&part_path, expected) {
                let _ = remove_file_if_exists(&part_path);
                return Err(download_error(format!("{err:#}")));
            }
        }

        remove_file_if_exists(archive_path).map_err(|err| download_error(err.to_string()))?;
        fs::rename(&part_path, archive_path).map_err(|err| {
            download_error(format!(
                "failed to move download into place at {}: {err}",
                archive_path.display()
            ))
        })?;
        Ok(())
    }

    /// Streams the locator into `out_path`, returning bytes written and the length the
    /// source announced, if any.
    fn fetch_to(&self, locator: &str, out_path: &Path) -> Result<(u64, Option<u64>), String> {
        let mut out = File::create(out_path)
            .map_err(|err| format!("failed to create {}: {err}", out_path.display()))?;

        let (written, announced) = if is_remote_locator(locator) {
            let client = Client::builder()
                .connect_timeout(self.connect_timeout)
                .timeout(None::<Duration>)
                .build()
                .map_err(|err| format!("failed to build http client: {err}"))?;
            let response = client
                .get(locator)
                .header(USER_AGENT, concat!("freshen/", env!("CARGO_PKG_VERSION")))
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(|err| err.to_string())?;
            let announced = response.content_length();
            let written = self.copy_with_progress(response, &mut out, announced)?;
            (written, announced)
        } else {
            let path = local_locator_path(locator);
            let file = File::open(&path)
                .map_err(|err| format!("failed to open {}: {err}", path.display()))?;
            let announced = file.metadata().ok().map(|metadata| metadata.len());
            let written = self.copy_with_progress(file, &mut out, announced)?;
            (written, announced)
        };

        out.sync_all()
            .map_err(|err| format!("failed to flush {}: {err}", out_path.display()))?;
        Ok((written, announced))
    }

    fn copy_with_progress<R: Read>(
        &self,
        mut reader: R,
        out: &mut File,
        total: Option<u64>,
    ) -> Result<u64, String> {
        let mut buf = vec![0_u8; 64 * 1024];
        let mut written = 0_u64;
        loop {
            let read = reader
                .read(&mut buf)
                .map_err(|err| format!("transfer interrupted after {written} bytes: {err}"))?;
            if read == 0 {
                break;
            }
            out.write_all(&buf[..read])
                .map_err(|err| format!("failed to write download: {err}"))?;
            written += read as u64;
            if let Some(progress) = self.progress {
                progress.on_progress(written, total);
            }
        }
        Ok(written)
    }
}

pub(crate) fn verify_length(
    written: u64,
    announced: Option<u64>,
    expected: Option<u64>,
) -> Result<(), String> {
    for (label, size) in [("announced", announced), ("expected", expected)] {
        if let Some(size) = size {
            if size != written {
                return Err(format!(
                    "truncated transfer: {label} {size} bytes, received {written}"
                ));
            }
        }
    }
    Ok(())
}

fn filesystem_error(err: std::io::Error, message: String) -> StageError {
    StageError::Filesystem(anyhow::Error::new(err).context(message))
}

fn is_remote_locator(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_locator_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}
