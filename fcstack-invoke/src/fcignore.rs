//! `.fcignore` selection and matching
//!
//! An `.fcignore` inside the code directory is preferred. The legacy location
//! at the project base dir still works but is deprecated.

use crate::error::{InvokeError, Result};
use crate::function::{Runtime, RuntimeFamily};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const IGNORE_FILE_NAME: &str = ".fcignore";

/// Excluded regardless of any ignore file
const BUILTIN_IGNORES: [&str; 9] = [
    ".git",
    ".svn",
    ".env",
    ".DS_Store",
    ".s/nas",
    ".s/tmp",
    ".s/package",
    ".fcignore",
    ".nas.yml",
];

const PYTHON_IGNORES: [&str; 1] = ["__pycache__"];

/// Returns true for paths that must be left out of the function code
pub type IgnorePredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Where ignore rules come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreSource {
    /// `<code_uri>/.fcignore`, rooted at the code dir
    CodeUri { code_uri: PathBuf },
    /// `<base_dir>/.fcignore` (if any), rooted at the base dir. Paths under
    /// `code_uri` are matched as if they lived under `original_code_uri`.
    BaseDir {
        base_dir: PathBuf,
        code_uri: PathBuf,
        original_code_uri: PathBuf,
    },
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Pick the ignore source for a function
pub async fn select_ignore_source(
    base_dir: &Path,
    code_uri: &Path,
    original_code_uri: &Path,
) -> IgnoreSource {
    if is_regular_file(&code_uri.join(IGNORE_FILE_NAME)).await {
        debug!(code_uri = %code_uri.display(), "Using .fcignore from codeUri");
        return IgnoreSource::CodeUri {
            code_uri: code_uri.to_path_buf(),
        };
    }

    if is_regular_file(&base_dir.join(IGNORE_FILE_NAME)).await {
        warn!(
            ".fcignore file will be placed under codeUri only in the future. Please update it \
             with the relative path and then move it to the codeUri as soon as possible."
        );
    }

    IgnoreSource::BaseDir {
        base_dir: base_dir.to_path_buf(),
        code_uri: code_uri.to_path_buf(),
        original_code_uri: original_code_uri.to_path_buf(),
    }
}

/// Builds the exclusion predicate for an ignore source
pub trait IgnorePredicateBuilder: Send + Sync {
    fn build(&self, source: &IgnoreSource, runtime: &Runtime) -> Result<IgnorePredicate>;
}

/// Gitignore-syntax `.fcignore` files plus built-in rules
#[derive(Debug, Default, Clone, Copy)]
pub struct FcIgnoreBuilder;

impl FcIgnoreBuilder {
    fn load(root: &Path, runtime: &Runtime) -> Result<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);

        let extra: &[&str] = match runtime.family() {
            RuntimeFamily::Python => &PYTHON_IGNORES,
            _ => &[],
        };
        for pattern in BUILTIN_IGNORES.iter().chain(extra) {
            builder
                .add_line(None, pattern)
                .map_err(|e| invalid_rules(root, &e))?;
        }

        let ignore_file = root.join(IGNORE_FILE_NAME);
        if ignore_file.is_file() {
            if let Some(e) = builder.add(&ignore_file) {
                warn!(file = %ignore_file.display(), error = %e, "Skipping malformed .fcignore rules");
            }
        }

        builder.build().map_err(|e| invalid_rules(root, &e))
    }
}

fn invalid_rules(root: &Path, e: &ignore::Error) -> InvokeError {
    InvokeError::IgnoreRules {
        root: root.to_path_buf(),
        reason: e.to_string(),
    }
}

fn is_matched(gitignore: &Gitignore, root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    if relative.as_os_str().is_empty() {
        return false;
    }
    gitignore
        .matched_path_or_any_parents(relative, path.is_dir())
        .is_ignore()
}

impl IgnorePredicateBuilder for FcIgnoreBuilder {
    fn build(&self, source: &IgnoreSource, runtime: &Runtime) -> Result<IgnorePredicate> {
        match source {
            IgnoreSource::CodeUri { code_uri } => {
                let gitignore = Self::load(code_uri, runtime)?;
                let root = code_uri.clone();
                Ok(Arc::new(move |path: &Path| is_matched(&gitignore, &root, path)))
            }
            IgnoreSource::BaseDir {
                base_dir,
                code_uri,
                original_code_uri,
            } => {
                let gitignore = Self::load(base_dir, runtime)?;
                let root = base_dir.clone();
                let code_uri = code_uri.clone();
                let original = original_code_uri.clone();
                Ok(Arc::new(move |path: &Path| match path.strip_prefix(&code_uri) {
                    Ok(relative) => is_matched(&gitignore, &root, &original.join(relative)),
                    Err(_) => is_matched(&gitignore, &root, path),
                }))
            }
        }
    }
}
