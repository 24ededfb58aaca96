//! Function image selection and provisioning

use crate::docker::ContainerRuntimeClient;
use crate::error::{InvokeError, Result};
use crate::function::{FunctionConfig, Runtime};
use tracing::info;

pub const DEFAULT_REGISTRY: &str = "registry.cn-beijing.aliyuncs.com";
pub const DEFAULT_IMAGE_VERSION: &str = "1.10.6";

/// Maps a runtime to the image that runs it
pub trait RuntimeImageLookup: Send + Sync {
    fn image_for(&self, runtime: &Runtime) -> Result<String>;
}

/// `<registry>/aliyunfc/runtime-<name>:<version>` images
#[derive(Debug, Clone)]
pub struct RegistryImageLookup {
    pub registry: String,
    pub version: String,
}

impl Default for RegistryImageLookup {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            version: DEFAULT_IMAGE_VERSION.to_string(),
        }
    }
}

impl RuntimeImageLookup for RegistryImageLookup {
    fn image_for(&self, runtime: &Runtime) -> Result<String> {
        let name = runtime
            .image_name()
            .ok_or_else(|| InvokeError::UnknownRuntime(runtime.to_string()))?;
        Ok(format!(
            "{}/aliyunfc/runtime-{}:{}",
            self.registry, name, self.version
        ))
    }
}

/// Pick the image for `function`: the declared image for custom containers,
/// the runtime lookup otherwise.
pub fn resolve_image(function: &FunctionConfig, lookup: &dyn RuntimeImageLookup) -> Result<String> {
    if function.runtime.is_custom_container() {
        return function
            .custom_container_image()
            .map(str::to_string)
            .ok_or_else(|| InvokeError::ImageProvision {
                image: String::new(),
                reason: format!(
                    "custom-container function '{}' declares no image",
                    function.name
                ),
            });
    }
    lookup.image_for(&function.runtime)
}

/// Resolve the image and make sure it is present locally
pub async fn provision_image(
    function: &FunctionConfig,
    lookup: &dyn RuntimeImageLookup,
    client: &dyn ContainerRuntimeClient,
) -> Result<String> {
    let image = resolve_image(function, lookup)?;
    client.pull_image_if_needed(&image).await?;
    info!(image = %image, function = %function.name, "Function image ready");
    Ok(image)
}
