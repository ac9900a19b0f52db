use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Public protoc release archive, keyed by `{version}` and `{os_arch}`.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://github.com/protocolbuffers/protobuf/releases/download/v{version}/protoc-{version}-{os_arch}.zip";

/// Platform suffix used by protoc release archives (`linux-x86_64`, `win64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTag(&'static str);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported os [{os}] and arch [{arch}] for protoc distributions")]
pub struct UnsupportedPlatform {
    pub os: String,
    pub arch: String,
}

impl PlatformTag {
    /// Maps an os/arch pair onto a release tag.
    ///
    /// Both Go spellings (`darwin`, `amd64`, `386`, `arm64`) and Rust spellings (`macos`,
    /// `x86_64`, `x86`, `aarch64`) are accepted.
    ///
    /// # Errors
    /// Returns [`UnsupportedPlatform`] for pairs outside the allow-list.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self, UnsupportedPlatform> {
        let tag = match (normalize_os(os), normalize_arch(arch)) {
            ("darwin", "amd64") => "osx-x86_64",
            ("darwin", "arm64") => "osx-aarch_64",
            ("darwin", _) => "osx-universal_binary",
            ("linux", "386") => "linux-x86_32",
            ("linux", "amd64") => "linux-x86_64",
            ("linux", "arm64") => "linux-aarch_64",
            ("windows", "386") => "win32",
            ("windows", "amd64") => "win64",
            _ => {
                return Err(UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(Self(tag))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

fn normalize_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" | "i386" | "i686" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("download url template has an unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },
    #[error("download url template uses unknown placeholder {{{name}}}; expected {{version}} or {{os_arch}}")]
    UnknownPlaceholder { name: String },
}

/// Expands `{version}` and `{os_arch}` in a download url template.
///
/// # Errors
/// Returns [`TemplateError`] for unknown or unterminated placeholders.
pub fn render_download_url(
    template: &str,
    version: &str,
    platform: PlatformTag,
) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let end = tail.find('}').ok_or(TemplateError::Unterminated {
            offset: template.len() - rest.len() + start,
        })?;
        match &tail[..end] {
            "version" => rendered.push_str(version),
            "os_arch" => rendered.push_str(platform.as_str()),
            other => {
                return Err(TemplateError::UnknownPlaceholder {
                    name: other.to_string(),
                })
            }
        }
        rest = &tail[end + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// Cache directory name for one fully rendered download url.
///
/// The key is the url-safe, unpadded base64 of the url's SHA-256, so distinct versions or
/// platforms never share a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributionKey(String);

impl DistributionKey {
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
