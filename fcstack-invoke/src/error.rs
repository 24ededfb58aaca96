//! Invocation engine errors

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Mount category that failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountCategory {
    Code,
    Nas,
    Layer,
    TmpDir,
    Debugger,
    Passwd,
}

impl MountCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Nas => "nas",
            Self::Layer => "layer",
            Self::TmpDir => "tmp-dir",
            Self::Debugger => "debugger",
            Self::Passwd => "passwd",
        }
    }
}

impl fmt::Display for MountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to extract code archive {path}: {reason}")]
    ArchiveExtraction { path: PathBuf, reason: String },

    #[error("Failed to resolve {category} mount: {reason}")]
    MountResolution {
        category: MountCategory,
        reason: String,
    },

    #[error("Failed to provision image {image}: {reason}")]
    ImageProvision { image: String, reason: String },

    #[error("Unknown runtime: {0}")]
    UnknownRuntime(String),

    #[error("Failed to write {ide} debug config: {reason}")]
    DebugConfigWrite { ide: &'static str, reason: String },

    #[error("Invalid ignore rules under {root}: {reason}")]
    IgnoreRules { root: PathBuf, reason: String },

    #[error("Failed to clean up {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Session is unusable after a failed initialization")]
    SessionUnusable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    pub(crate) fn mount(category: MountCategory, reason: impl Into<String>) -> Self {
        Self::MountResolution {
            category,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = InvokeError> = std::result::Result<T, E>;
