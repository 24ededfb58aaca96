//! Invocation context shared by every step of a session

use crate::debug::DebugIde;
use crate::function::{FunctionConfig, Runtime, ServiceConfig, TriggerConfig};
use fcstack_core::{AccountRegion, Credentials};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Debugger settings requested for the session
#[derive(Debug, Clone, Default)]
pub struct DebugSettings {
    pub port: Option<u16>,
    pub ide: Option<DebugIde>,
    pub args: Option<String>,
}

/// Everything a session knows about the function it invokes
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub region: String,
    pub credentials: Credentials,
    pub base_dir: PathBuf,
    pub service: ServiceConfig,
    pub function: FunctionConfig,
    pub trigger: Option<TriggerConfig>,
    pub debug: DebugSettings,
    /// Code location resolved against `base_dir`
    pub code_uri: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub debugger_path: Option<PathBuf>,
}

impl InvocationContext {
    pub fn new(
        region: impl Into<String>,
        credentials: Credentials,
        base_dir: impl Into<PathBuf>,
        service: ServiceConfig,
        function: FunctionConfig,
    ) -> Self {
        let base_dir = absolute_path(&base_dir.into());
        let code_uri = function
            .code_uri
            .as_deref()
            .map(|uri| strip_cur_dir(&base_dir.join(uri)));

        Self {
            region: region.into(),
            credentials,
            base_dir,
            service,
            function,
            trigger: None,
            debug: DebugSettings::default(),
            code_uri,
            tmp_dir: None,
            debugger_path: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_debug(mut self, debug: DebugSettings) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(self.resolve(tmp_dir.into()));
        self
    }

    pub fn with_debugger_path(mut self, debugger_path: impl Into<PathBuf>) -> Self {
        self.debugger_path = Some(self.resolve(debugger_path.into()));
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service.name
    }

    pub fn function_name(&self) -> &str {
        &self.function.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.function.runtime
    }

    pub fn account_region(&self) -> AccountRegion {
        AccountRegion::new(self.credentials.account_id.clone(), self.region.clone())
    }

    /// Code location before relocation, resolved against `base_dir`
    pub fn original_code_dir(&self) -> Option<PathBuf> {
        self.function
            .original_code_uri
            .as_deref()
            .map(|uri| self.resolve(uri))
    }

    /// Original code location, falling back to the resolved code URI
    pub fn original_or_code_uri(&self) -> Option<PathBuf> {
        self.original_code_dir().or_else(|| self.code_uri.clone())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `path` against the base dir; absolute paths are kept
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        strip_cur_dir(&self.base_dir.join(path))
    }
}

fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Make `path` absolute against the current directory.
///
/// Bind mount sources must be absolute, so every host path the engine
/// derives starts from an absolute base dir.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return strip_cur_dir(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => strip_cur_dir(&cwd.join(path)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot resolve relative path, current dir unavailable");
            path.to_path_buf()
        }
    }
}
