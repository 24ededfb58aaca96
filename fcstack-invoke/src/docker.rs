//! Container runtime client
//!
//! The engine only needs three things from the container runtime: pulling an
//! image when it is missing, knowing whether host bind mounts work natively,
//! and a fresh container name.

use async_trait::async_trait;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{InvokeError, Result};

/// Prefix of every container name this crate generates
pub const CONTAINER_NAME_PREFIX: &str = "fcstack";

/// Oldest Docker server version known to work with the function images
const MIN_DOCKER_VERSION: (u32, u32) = (17, 6);

#[async_trait]
pub trait ContainerRuntimeClient: Send + Sync {
    /// Make sure `image` exists locally, pulling it if needed
    async fn pull_image_if_needed(&self, image: &str) -> Result<()>;

    /// False inside Docker Toolbox style VMs, where host paths must be rewritten
    async fn supports_native_bind_mounts(&self) -> Result<bool>;

    fn generate_container_name(&self) -> String {
        generate_container_name()
    }
}

/// `fcstack-<uuid>` container name
pub fn generate_container_name() -> String {
    format!("{}-{}", CONTAINER_NAME_PREFIX, uuid::Uuid::new_v4().simple())
}

fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts
        .next()
        .and_then(|p| p.trim_start_matches('0').parse().ok())
        .unwrap_or(0);
    Some((major, minor))
}

/// Docker Engine API client
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect using the local defaults (DOCKER_HOST or the unix socket)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            InvokeError::ImageProvision {
                image: String::new(),
                reason: format!("Docker not available: {}", e),
            }
        })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntimeClient for DockerClient {
    async fn pull_image_if_needed(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image already present");
            return Ok(());
        }

        info!(image = %image, "Pulling function image");

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(|e| InvokeError::ImageProvision {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
            if let Some(status) = progress.status {
                debug!(image = %image, status = %status, "Pull progress");
            }
        }

        info!(image = %image, "Pulled function image");
        Ok(())
    }

    async fn supports_native_bind_mounts(&self) -> Result<bool> {
        let system = self
            .docker
            .info()
            .await
            .map_err(|e| InvokeError::ImageProvision {
                image: String::new(),
                reason: format!("Docker info failed: {}", e),
            })?;

        if let Some((major, minor)) = system.server_version.as_deref().and_then(parse_major_minor)
        {
            if (major, minor) < MIN_DOCKER_VERSION {
                warn!(
                    version = %format!("{}.{}", major, minor),
                    "Docker server is older than 17.06, mounts may misbehave"
                );
            }
        }

        let toolbox = system
            .operating_system
            .as_deref()
            .is_some_and(|os| os.contains("Boot2Docker"));
        Ok(!toolbox)
    }
}
