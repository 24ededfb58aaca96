//! Container mount resolution
//!
//! Each mount category is resolved on its own and then assembled into one
//! ordered list in which every container path appears once.

use crate::error::{InvokeError, MountCategory, Result};
use crate::function::NasConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const CODE_MOUNT_DIR: &str = "/code";
pub const LAYER_MOUNT_DIR: &str = "/opt";
pub const TMP_MOUNT_DIR: &str = "/tmp";
pub const DEBUGGER_MOUNT_DIR: &str = "/tmp/debugger_files";
pub const PASSWD_MOUNT_PATH: &str = "/etc/passwd";

/// Ids used when neither the host nor NAS config supplies any
pub const DEFAULT_DOCKER_ID: u32 = 10003;

/// A host path bound into the function container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountDescriptor {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

impl MountDescriptor {
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
            uid: None,
            gid: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn owned_by(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.host_path.as_os_str().is_empty() || self.container_path.is_empty()
    }

    /// `host:container[:ro]` bind string
    pub fn to_bind(&self) -> String {
        let mut bind = format!("{}:{}", self.host_path.display(), self.container_path);
        if self.read_only {
            bind.push_str(":ro");
        }
        bind
    }
}

/// User the function container runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockerUser {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for DockerUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Effective ids of the current process.
///
/// Only Linux hosts share ids with the container through bind mounts, so
/// other platforms report none.
pub fn host_ids() -> Option<(u32, u32)> {
    #[cfg(target_os = "linux")]
    {
        use nix::unistd::{getegid, geteuid};
        Some((geteuid().as_raw(), getegid().as_raw()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Pick the container user.
///
/// Host ids win so files written through bind mounts stay owned by the
/// caller; NAS ids come next, then the default.
pub fn resolve_docker_user(nas: Option<&NasConfig>, host: Option<(u32, u32)>) -> DockerUser {
    if let Some((uid, gid)) = host {
        debug!(uid, gid, "Using host user for the function container");
        return DockerUser { uid, gid };
    }

    DockerUser {
        uid: nas.and_then(NasConfig::user_id).unwrap_or(DEFAULT_DOCKER_ID),
        gid: nas.and_then(NasConfig::group_id).unwrap_or(DEFAULT_DOCKER_ID),
    }
}

/// Mount the function code: a directory at `/code`, a single file inside it.
pub async fn resolve_code_mount(code_path: &Path) -> Result<MountDescriptor> {
    let meta = tokio::fs::metadata(code_path).await.map_err(|e| {
        InvokeError::mount(
            MountCategory::Code,
            format!("{}: {}", code_path.display(), e),
        )
    })?;

    let container_path = if meta.is_dir() {
        CODE_MOUNT_DIR.to_string()
    } else {
        let name = code_path.file_name().ok_or_else(|| {
            InvokeError::mount(
                MountCategory::Code,
                format!("{} has no file name", code_path.display()),
            )
        })?;
        format!("{}/{}", CODE_MOUNT_DIR, name.to_string_lossy())
    };

    Ok(MountDescriptor::new(code_path, container_path).read_only())
}

/// Local cache directory holding the function's downloaded layers
pub fn layer_cache_path(base_dir: &Path, service_name: &str, function_name: &str) -> PathBuf {
    base_dir
        .join(".s")
        .join("layers")
        .join(format!("{}_{}", service_name, function_name))
}

pub async fn resolve_layer_mount(layer_cache: &Path) -> Result<MountDescriptor> {
    tokio::fs::create_dir_all(layer_cache)
        .await
        .map_err(|e| InvokeError::mount(MountCategory::Layer, e.to_string()))?;
    Ok(MountDescriptor::new(layer_cache, LAYER_MOUNT_DIR).read_only())
}

pub async fn resolve_tmp_dir_mount(tmp_dir: Option<&Path>) -> Result<Option<MountDescriptor>> {
    let Some(tmp_dir) = tmp_dir else {
        return Ok(None);
    };

    tokio::fs::create_dir_all(tmp_dir)
        .await
        .map_err(|e| InvokeError::mount(MountCategory::TmpDir, e.to_string()))?;
    Ok(Some(MountDescriptor::new(tmp_dir, TMP_MOUNT_DIR)))
}

pub async fn resolve_debugger_mount(
    debugger_path: Option<&Path>,
) -> Result<Option<MountDescriptor>> {
    let Some(debugger_path) = debugger_path else {
        return Ok(None);
    };

    if !tokio::fs::try_exists(debugger_path).await.unwrap_or(false) {
        return Err(InvokeError::mount(
            MountCategory::Debugger,
            format!("{} does not exist", debugger_path.display()),
        ));
    }
    Ok(Some(
        MountDescriptor::new(debugger_path, DEBUGGER_MOUNT_DIR).read_only(),
    ))
}

fn passwd_contents(user: DockerUser) -> String {
    let mut contents = String::from("root:x:0:0:root:/root:/bin/bash\n");
    if user.uid != 0 {
        contents.push_str(&format!(
            "user:x:{}:{}::/tmp:/usr/sbin/nologin\n",
            user.uid, user.gid
        ));
    }
    contents
}

/// Write a passwd file naming the container user and mount it over
/// `/etc/passwd`.
///
/// The file is shared by sessions with the same ids. It is written to a
/// unique sibling first and renamed into place, so a container that already
/// mounted it never sees a truncated file.
pub async fn resolve_passwd_mount(user: DockerUser, temp_root: &Path) -> Result<MountDescriptor> {
    let to_error = |e: std::io::Error| InvokeError::mount(MountCategory::Passwd, e.to_string());

    tokio::fs::create_dir_all(temp_root).await.map_err(to_error)?;
    let name = format!("fcstack-passwd-{}-{}", user.uid, user.gid);
    let path = temp_root.join(&name);
    let staging = temp_root.join(format!(".{}.{}", name, Uuid::new_v4().simple()));

    tokio::fs::write(&staging, passwd_contents(user))
        .await
        .map_err(to_error)?;
    if let Err(e) = tokio::fs::rename(&staging, &path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(to_error(e));
    }

    Ok(MountDescriptor::new(path, PASSWD_MOUNT_PATH).read_only())
}

/// Independently resolved mount categories
#[derive(Debug, Default)]
pub struct MountParts {
    pub code: Option<MountDescriptor>,
    pub nas: Vec<MountDescriptor>,
    pub passwd: Option<MountDescriptor>,
    pub layer: Option<MountDescriptor>,
    pub tmp_dir: Option<MountDescriptor>,
    pub debugger: Option<MountDescriptor>,
}

/// Concatenate the parts in mount order, dropping empty descriptors and any
/// descriptor whose container path is already taken.
pub fn assemble_mounts(parts: MountParts) -> Vec<MountDescriptor> {
    let MountParts {
        code,
        nas,
        passwd,
        layer,
        tmp_dir,
        debugger,
    } = parts;

    let ordered = code
        .into_iter()
        .chain(nas)
        .chain(passwd)
        .chain(layer)
        .chain(tmp_dir)
        .chain(debugger);

    let mut seen = HashSet::new();
    let mut mounts = Vec::new();
    for mount in ordered.filter(|m| !m.is_empty()) {
        if !seen.insert(mount.container_path.clone()) {
            warn!(
                container_path = %mount.container_path,
                host_path = %mount.host_path.display(),
                "Dropping mount with duplicate container path"
            );
            continue;
        }
        mounts.push(mount);
    }
    mounts
}

static WINDOWS_DRIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]):[\\/]*(.*)$").expect("drive letter pattern is valid")
});

/// Rewrite a host path into the form a Docker Toolbox VM shares it under
pub fn toolbox_path(host_path: &Path) -> PathBuf {
    let raw = host_path.to_string_lossy();
    match WINDOWS_DRIVE.captures(&raw) {
        Some(caps) => {
            let drive = caps[1].to_ascii_lowercase();
            let rest = caps[2].replace('\\', "/");
            PathBuf::from(format!("/{}/{}", drive, rest))
        }
        None => PathBuf::from(raw.replace('\\', "/")),
    }
}

/// Apply [`toolbox_path`] to every mount
pub fn transform_mounts_for_toolbox(mounts: Vec<MountDescriptor>) -> Vec<MountDescriptor> {
    mounts
        .into_iter()
        .map(|mut mount| {
            mount.host_path = toolbox_path(&mount.host_path);
            mount
        })
        .collect()
}
