//! Download-on-miss cache of protoc release archives.
//!
//! Layout under the cache root:
//!
//! ```text
//! protoc/<key>.zip   staged release archive
//! protoc/<key>/      extracted distribution (bin/, include/)
//! ```
//!
//! `<key>` is the [`DistributionKey`] of the rendered download url.

use std::env;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use pbgen_domain::{render_download_url, DistributionKey, PlatformTag};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::archive::extract_zip;
use crate::error::{ArchiveIssue, PbgenError};
use crate::fs::{create_dir_all, remove_dir_all_if_exists};

pub const DISTRIBUTION_DIR: &str = "protoc";
/// Smaller cached archives are assumed to be truncated downloads or error pages.
pub const MIN_ARCHIVE_BYTES: u64 = 1024 * 1024;
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("pbgen/", env!("CARGO_PKG_VERSION"));

/// Host platform, honouring `GOOS`/`GOARCH` overrides.
///
/// # Errors
/// Returns an error for platforms without a protoc release.
pub fn detect_platform() -> Result<PlatformTag> {
    let os = env::var("GOOS").unwrap_or_else(|_| env::consts::OS.to_string());
    let arch = env::var("GOARCH").unwrap_or_else(|_| env::consts::ARCH.to_string());
    Ok(PlatformTag::from_os_arch(&os, &arch)?)
}

/// An extracted protoc distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    root: PathBuf,
}

impl Distribution {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn compiler(&self) -> PathBuf {
        self.root
            .join("bin")
            .join(format!("protoc{}", env::consts::EXE_SUFFIX))
    }

    /// Bundled well-known types (`google/protobuf/*.proto`).
    #[must_use]
    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }
}

pub struct DistributionCache {
    root: PathBuf,
    template: String,
    version: String,
    platform: Option<PlatformTag>,
    download_url: OnceCell<String>,
    distribution_path: OnceCell<PathBuf>,
}

impl DistributionCache {
    /// `cache_root` is the toolchain cache root; archives live under its `protoc/` child.
    #[must_use]
    pub fn new(cache_root: &Path, template: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            root: cache_root.join(DISTRIBUTION_DIR),
            template: template.into(),
            version: version.into(),
            platform: None,
            download_url: OnceCell::new(),
            distribution_path: OnceCell::new(),
        }
    }

    /// Pins the platform instead of detecting it from the environment.
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformTag) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Rendered download url, computed once per cache instance.
    ///
    /// # Errors
    /// Returns an error for unsupported platforms or invalid templates.
    pub fn download_url(&self) -> Result<&str> {
        self.download_url
            .get_or_try_init(|| {
                let platform = match self.platform {
                    Some(platform) => platform,
                    None => detect_platform()?,
                };
                let url = render_download_url(&self.template, &self.version, platform)
                    .with_context(|| format!("rendering download url [{}]", self.template))?;
                Ok::<_, anyhow::Error>(url)
            })
            .map(String::as_str)
    }

    /// `protoc/<key>`, computed once per cache instance.
    ///
    /// # Errors
    /// Propagates [`DistributionCache::download_url`] failures.
    pub fn distribution_path(&self) -> Result<&Path> {
        self.distribution_path
            .get_or_try_init(|| {
                let key = DistributionKey::from_url(self.download_url()?);
                Ok::<_, anyhow::Error>(self.root.join(key.as_str()))
            })
            .map(PathBuf::as_path)
    }

    /// # Errors
    /// Propagates [`DistributionCache::download_url`] failures.
    pub fn archive_path(&self) -> Result<PathBuf> {
        let mut path = self.distribution_path()?.as_os_str().to_owned();
        path.push(".zip");
        Ok(PathBuf::from(path))
    }

    /// Makes sure an extracted distribution exists and returns it.
    ///
    /// A cached archive is reused when it is at least [`MIN_ARCHIVE_BYTES`]; otherwise it is
    /// downloaded again, bounded by [`DOWNLOAD_TIMEOUT`] or whatever is left until `deadline`.
    /// The extracted tree is always removed and rebuilt from the archive.
    ///
    /// # Errors
    /// Returns transport, archive-integrity or filesystem errors; nothing falls back to a stale
    /// extraction.
    pub fn ensure(&self, deadline: Option<Instant>) -> Result<Distribution> {
        let url = self.download_url()?;
        let archive = self.archive_path()?;
        create_dir_all(&self.root)?;
        info!(archive = %archive.display(), "protoc distribution archive");

        match fs::metadata(&archive) {
            Ok(meta) if meta.len() >= MIN_ARCHIVE_BYTES => {
                debug!(bytes = meta.len(), "reusing cached protoc archive");
            }
            Ok(meta) => {
                debug!(bytes = meta.len(), "cached protoc archive undersized; downloading again");
                download(url, &archive, deadline)?;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => download(url, &archive, deadline)?,
            Err(err) => return Err(PbgenError::filesystem("stat", &archive, err).into()),
        }

        let size = fs::metadata(&archive)
            .map_err(|err| PbgenError::filesystem("stat", &archive, err))?
            .len();
        if size < MIN_ARCHIVE_BYTES {
            return Err(PbgenError::ArchiveIntegrity {
                path: archive,
                issue: ArchiveIssue::Undersized {
                    size,
                    minimum: MIN_ARCHIVE_BYTES,
                },
            }
            .into());
        }

        let dist_path = self.distribution_path()?.to_path_buf();
        let file =
            File::open(&archive).map_err(|err| PbgenError::filesystem("open", &archive, err))?;
        remove_dir_all_if_exists(&dist_path)?;
        let files = extract_zip(file, &dist_path)
            .with_context(|| format!("extracting {}", archive.display()))?;
        info!(files, dest = %dist_path.display(), "unzipped protoc distribution");
        Ok(Distribution { root: dist_path })
    }
}

fn download(url: &str, dest: &Path, deadline: Option<Instant>) -> Result<()> {
    let timeout = download_timeout(url, deadline)?;
    info!(%url, "downloading protoc");
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build http client")?;
    let response = client
        .get(url)
        .send()
        .map_err(|err| PbgenError::transport(url, err))?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(PbgenError::transport(url, format!("unexpected status {status}")).into());
    }
    let body = response
        .bytes()
        .map_err(|err| PbgenError::transport(url, err))?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(parent)
        .map_err(|err| PbgenError::filesystem("create temp file", parent, err))?;
    staged
        .write_all(&body)
        .map_err(|err| PbgenError::filesystem("write file", staged.path(), err))?;
    staged
        .persist(dest)
        .map_err(|err| PbgenError::filesystem("persist download", dest, err.error))?;
    debug!(bytes = body.len(), dest = %dest.display(), "download stored");
    Ok(())
}

fn download_timeout(url: &str, deadline: Option<Instant>) -> Result<Duration> {
    let Some(deadline) = deadline else {
        return Ok(DOWNLOAD_TIMEOUT);
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(PbgenError::transport(url, "deadline elapsed before download").into());
    }
    Ok(remaining.min(DOWNLOAD_TIMEOUT))
}
