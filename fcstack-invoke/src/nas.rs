//! NAS mount resolution
//!
//! Remote NAS exports are emulated by directories under a local NAS base dir
//! so functions see the same layout they would see in the cloud.

use crate::error::{InvokeError, MountCategory, Result};
use crate::function::{NasConfig, NasSettings, AUTO_NAS_ID, AUTO_NAS_MOUNT_DIR};
use crate::mount::MountDescriptor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default NAS base dir, relative to the project base dir
pub const DEFAULT_NAS_PATH_SUFFIX: &str = ".s/nas";

/// Turns a service's NAS configuration into mounts
#[async_trait]
pub trait NasMountResolver: Send + Sync {
    async fn resolve(
        &self,
        base_dir: &Path,
        service_name: &str,
        nas_config: Option<&NasConfig>,
        nas_base_dir: &Path,
    ) -> Result<Vec<MountDescriptor>>;
}

/// Maps each NAS export to `<nas_base_dir>/<host>/<remote path>`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalNasResolver;

impl LocalNasResolver {
    fn local_dir_for(nas_base_dir: &Path, host: &str, remote_path: &str) -> PathBuf {
        let remote = remote_path.trim_start_matches('/');
        if remote.is_empty() {
            nas_base_dir.join(host)
        } else {
            nas_base_dir.join(host).join(remote)
        }
    }

    fn plan_explicit(
        settings: &NasSettings,
        nas_base_dir: &Path,
    ) -> Result<Vec<MountDescriptor>> {
        settings
            .mount_points
            .iter()
            .map(|point| {
                let (host, remote) = point.server_parts().ok_or_else(|| {
                    InvokeError::mount(
                        MountCategory::Nas,
                        format!(
                            "serverAddr '{}' must look like host:/path",
                            point.server_addr
                        ),
                    )
                })?;
                if !point.mount_dir.starts_with('/') {
                    return Err(InvokeError::mount(
                        MountCategory::Nas,
                        format!("mountDir '{}' must be absolute", point.mount_dir),
                    ));
                }

                Ok(MountDescriptor::new(
                    Self::local_dir_for(nas_base_dir, host, remote),
                    point.mount_dir.clone(),
                )
                .owned_by(settings.user_id, settings.group_id))
            })
            .collect()
    }
}

#[async_trait]
impl NasMountResolver for LocalNasResolver {
    async fn resolve(
        &self,
        _base_dir: &Path,
        service_name: &str,
        nas_config: Option<&NasConfig>,
        nas_base_dir: &Path,
    ) -> Result<Vec<MountDescriptor>> {
        let mounts = match nas_config {
            None => return Ok(Vec::new()),
            Some(NasConfig::Auto(_)) => vec![MountDescriptor::new(
                nas_base_dir.join("auto-default").join(service_name),
                AUTO_NAS_MOUNT_DIR,
            )
            .owned_by(Some(AUTO_NAS_ID), Some(AUTO_NAS_ID))],
            Some(NasConfig::Explicit(settings)) => Self::plan_explicit(settings, nas_base_dir)?,
        };

        for mount in &mounts {
            tokio::fs::create_dir_all(&mount.host_path)
                .await
                .map_err(|e| {
                    InvokeError::mount(
                        MountCategory::Nas,
                        format!("{}: {}", mount.host_path.display(), e),
                    )
                })?;
            debug!(
                host_path = %mount.host_path.display(),
                container_path = %mount.container_path,
                "Resolved NAS mount"
            );
        }

        Ok(mounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{AutoNas, NasMountPoint};

    fn explicit(points: &[(&str, &str)]) -> NasConfig {
        NasConfig::Explicit(NasSettings {
            user_id: Some(1000),
            group_id: Some(1000),
            mount_points: points
                .iter()
                .map(|(server, dir)| NasMountPoint {
                    server_addr: server.to_string(),
                    mount_dir: dir.to_string(),
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_absent_config_yields_no_mounts() {
        let dir = tempfile::tempdir().unwrap();

        let mounts = LocalNasResolver
            .resolve(dir.path(), "svc", None, &dir.path().join(".s/nas"))
            .await
            .unwrap();
        assert!(mounts.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_mount_points() {
        let dir = tempfile::tempdir().unwrap();
        let nas_base = dir.path().join(".s/nas");
        let config = explicit(&[
            ("nas-1.example.com:/share", "/mnt/share"),
            ("nas-2.example.com:/", "/mnt/root"),
        ]);

        let mounts = LocalNasResolver
            .resolve(dir.path(), "svc", Some(&config), &nas_base)
            .await
            .unwrap();

        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].host_path, nas_base.join("nas-1.example.com/share"));
        assert_eq!(mounts[0].container_path, "/mnt/share");
        assert_eq!(mounts[0].uid, Some(1000));
        assert_eq!(mounts[1].host_path, nas_base.join("nas-2.example.com"));
        assert!(mounts[0].host_path.is_dir());
    }

    #[tokio::test]
    async fn test_auto_nas() {
        let dir = tempfile::tempdir().unwrap();
        let nas_base = dir.path().join("nas");

        let mounts = LocalNasResolver
            .resolve(
                dir.path(),
                "svc",
                Some(&NasConfig::Auto(AutoNas::Auto)),
                &nas_base,
            )
            .await
            .unwrap();

        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].container_path, "/mnt/auto");
        assert_eq!(mounts[0].host_path, nas_base.join("auto-default/svc"));
    }

    #[tokio::test]
    async fn test_malformed_entries_fail() {
        let dir = tempfile::tempdir().unwrap();
        let nas_base = dir.path().join("nas");

        for config in [
            explicit(&[("nas.example.com", "/mnt/nas")]),
            explicit(&[("nas.example.com:/share", "relative/dir")]),
        ] {
            let err = LocalNasResolver
                .resolve(dir.path(), "svc", Some(&config), &nas_base)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                InvokeError::MountResolution {
                    category: MountCategory::Nas,
                    ..
                }
            ));
        }
        assert!(!nas_base.exists());
    }
}
