use std::path::PathBuf;

/// Failure classes raised by the generation pipeline.
///
/// Core functions return `anyhow::Result` and wrap these with context, so callers that care about
/// the class can `downcast_ref::<PbgenError>()` on the chain.
#[derive(Debug, thiserror::Error)]
pub enum PbgenError {
    #[error("build graph could not resolve [{target}]: {reason}")]
    GraphResolution { target: String, reason: String },
    #[error("download of [{url}] failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("archive rejected at [{}]: {issue}", path.display())]
    ArchiveIntegrity { path: PathBuf, issue: ArchiveIssue },
    #[error("{operation} failed for [{}]", path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("command [{command}] failed: {status}")]
    Subprocess { command: String, status: String },
}

impl PbgenError {
    pub(crate) fn graph(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::GraphResolution {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn filesystem(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::GraphResolution { .. } => "graph_resolution",
            Self::Transport { .. } => "transport",
            Self::ArchiveIntegrity { .. } => "archive_integrity",
            Self::Filesystem { .. } => "filesystem",
            Self::Subprocess { .. } => "subprocess",
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GraphResolution { .. } => {
                Some("run `go mod tidy` so every imported package resolves")
            }
            Self::Transport { .. } => {
                Some("check network access or point --protoc-dl-url at a reachable mirror")
            }
            Self::ArchiveIntegrity { .. } => {
                Some("remove the cached archive with `pbgen cache prune --kind protoc`")
            }
            Self::Filesystem { .. } | Self::Subprocess { .. } => None,
        }
    }
}

/// Reasons an archive is refused before or during extraction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveIssue {
    #[error("entry [{entry}] escapes the destination directory")]
    PathTraversal { entry: String },
    #[error("archive is {size} bytes, below the {minimum} byte minimum")]
    Undersized { size: u64, minimum: u64 },
    #[error("archive is malformed: {reason}")]
    Malformed { reason: String },
}
