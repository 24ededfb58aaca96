//! Debug IDE configuration
//!
//! When a session runs with a debug port, the IDE it names gets a matching
//! attach configuration so breakpoints in the local code line up with the
//! code mounted at `/code`.

use crate::error::{InvokeError, Result};
use crate::function::{Runtime, RuntimeFamily};
use crate::mount::CODE_MOUNT_DIR;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// IDE named by the debug settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugIde {
    VsCode,
    PyCharm,
    /// Any other identifier; accepted and ignored
    Unsupported(String),
}

impl DebugIde {
    /// Parse an IDE identifier, ignoring case
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "vscode" => Self::VsCode,
            "pycharm" => Self::PyCharm,
            _ => Self::Unsupported(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::VsCode => "vscode",
            Self::PyCharm => "pycharm",
            Self::Unsupported(name) => name,
        }
    }
}

/// What a debug config writer needs to know about the invocation
#[derive(Debug, Clone)]
pub struct DebugTarget {
    pub base_dir: PathBuf,
    pub service_name: String,
    pub function_name: String,
    pub runtime: Runtime,
    pub original_code_dir: Option<PathBuf>,
    pub debug_port: u16,
}

impl DebugTarget {
    fn config_name(&self) -> String {
        format!("fc/{}/{}", self.service_name, self.function_name)
    }

    fn local_root(&self) -> String {
        self.original_code_dir.as_deref().map_or_else(
            || "${workspaceFolder}".to_string(),
            |dir| dir.display().to_string(),
        )
    }
}

#[async_trait]
pub trait DebugConfigWriter: Send + Sync {
    async fn write(&self, target: &DebugTarget) -> Result<()>;
}

/// Writes an attach configuration into `<base_dir>/.vscode/launch.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct VsCodeLaunchWriter;

impl VsCodeLaunchWriter {
    fn launch_path(base_dir: &Path) -> PathBuf {
        base_dir.join(".vscode").join("launch.json")
    }

    /// Attach configuration for the target's runtime family
    pub fn attach_config(target: &DebugTarget) -> Result<Value> {
        let name = target.config_name();
        let port = target.debug_port;
        let local_root = target.local_root();

        let config = match target.runtime.family() {
            RuntimeFamily::Nodejs => json!({
                "name": name,
                "type": "node",
                "request": "attach",
                "address": "localhost",
                "port": port,
                "localRoot": local_root,
                "remoteRoot": CODE_MOUNT_DIR,
                "protocol": "inspector",
                "stopOnEntry": false,
            }),
            RuntimeFamily::Python => json!({
                "name": name,
                "type": "python",
                "request": "attach",
                "host": "localhost",
                "port": port,
                "pathMappings": [{ "localRoot": local_root, "remoteRoot": CODE_MOUNT_DIR }],
            }),
            RuntimeFamily::Java => json!({
                "name": name,
                "type": "java",
                "request": "attach",
                "hostName": "localhost",
                "port": port,
            }),
            RuntimeFamily::Php => json!({
                "name": name,
                "type": "php",
                "request": "launch",
                "port": port,
                "stopOnEntry": false,
                "pathMappings": { CODE_MOUNT_DIR: local_root },
                "ignore": ["/var/fc/runtime/**"],
            }),
            RuntimeFamily::Dotnet | RuntimeFamily::Go | RuntimeFamily::Custom => {
                return Err(InvokeError::DebugConfigWrite {
                    ide: "vscode",
                    reason: format!("runtime {} has no VS Code attach support", target.runtime),
                });
            }
        };
        Ok(config)
    }
}

#[async_trait]
impl DebugConfigWriter for VsCodeLaunchWriter {
    async fn write(&self, target: &DebugTarget) -> Result<()> {
        let to_error = |reason: String| InvokeError::DebugConfigWrite {
            ide: "vscode",
            reason,
        };

        let config = Self::attach_config(target)?;
        let path = Self::launch_path(&target.base_dir);

        let mut launch = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| to_error(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                json!({ "version": "0.2.0", "configurations": [] })
            }
            Err(e) => return Err(to_error(e.to_string())),
        };

        let configurations = launch
            .get_mut("configurations")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| to_error(format!("{} has no configurations array", path.display())))?;

        let name = target.config_name();
        configurations.retain(|c| c.get("name").and_then(Value::as_str) != Some(name.as_str()));
        configurations.push(config);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| to_error(e.to_string()))?;
        }
        let rendered = serde_json::to_vec_pretty(&launch).map_err(|e| to_error(e.to_string()))?;
        tokio::fs::write(&path, rendered)
            .await
            .map_err(|e| to_error(e.to_string()))?;

        info!(path = %path.display(), config = %name, "Wrote VS Code debug config");
        Ok(())
    }
}

/// PyCharm has no project file to patch; log the remote debug setup instead
#[derive(Debug, Default, Clone, Copy)]
pub struct PyCharmTipsWriter;

#[async_trait]
impl DebugConfigWriter for PyCharmTipsWriter {
    async fn write(&self, target: &DebugTarget) -> Result<()> {
        debug!(function = %target.function_name, "Emitting PyCharm debug tips");
        info!(
            "Configure a PyCharm 'Python Debug Server' on port {} with path mapping {} -> {}, \
             then start it before invoking the function",
            target.debug_port,
            target.local_root(),
            CODE_MOUNT_DIR
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(base_dir: &Path, runtime: Runtime) -> DebugTarget {
        DebugTarget {
            base_dir: base_dir.to_path_buf(),
            service_name: "svc".to_string(),
            function_name: "fn".to_string(),
            runtime,
            original_code_dir: Some(base_dir.join("src")),
            debug_port: 9229,
        }
    }

    #[test]
    fn test_ide_parse_ignores_case() {
        assert_eq!(DebugIde::from_str("VSCode"), DebugIde::VsCode);
        assert_eq!(DebugIde::from_str("PYCHARM"), DebugIde::PyCharm);
        assert_eq!(
            DebugIde::from_str("emacs"),
            DebugIde::Unsupported("emacs".to_string())
        );
    }

    #[test]
    fn test_attach_config_per_family() {
        let base = Path::new("/proj");

        let node = VsCodeLaunchWriter::attach_config(&target(base, Runtime::Nodejs14)).unwrap();
        assert_eq!(node["type"], "node");
        assert_eq!(node["remoteRoot"], "/code");
        assert_eq!(node["localRoot"], "/proj/src");

        let python = VsCodeLaunchWriter::attach_config(&target(base, Runtime::Python39)).unwrap();
        assert_eq!(python["pathMappings"][0]["remoteRoot"], "/code");

        assert!(matches!(
            VsCodeLaunchWriter::attach_config(&target(base, Runtime::Go1)),
            Err(InvokeError::DebugConfigWrite { ide: "vscode", .. })
        ));
    }

    #[tokio::test]
    async fn test_vscode_writer_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let vscode = dir.path().join(".vscode");
        std::fs::create_dir_all(&vscode).unwrap();
        std::fs::write(
            vscode.join("launch.json"),
            r#"{"version":"0.2.0","configurations":[
                {"name":"fc/svc/fn","type":"stale"},
                {"name":"other","type":"node"}
            ]}"#,
        )
        .unwrap();

        VsCodeLaunchWriter
            .write(&target(dir.path(), Runtime::Nodejs14))
            .await
            .unwrap();

        let launch: Value =
            serde_json::from_slice(&std::fs::read(vscode.join("launch.json")).unwrap()).unwrap();
        let configs = launch["configurations"].as_array().unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0]["name"], "other");
        assert_eq!(configs[1]["type"], "node");
        assert_eq!(configs[1]["port"], 9229);
    }

    #[tokio::test]
    async fn test_vscode_writer_creates_launch_file() {
        let dir = tempfile::tempdir().unwrap();

        VsCodeLaunchWriter
            .write(&target(dir.path(), Runtime::Python36))
            .await
            .unwrap();

        assert!(dir.path().join(".vscode/launch.json").is_file());
    }
}
