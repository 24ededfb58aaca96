//! Function, service and trigger configuration models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Function runtimes
///
/// Identifiers outside the known set are kept verbatim in `Unknown` so the
/// image lookup can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Runtime {
    Nodejs10,
    Nodejs12,
    Nodejs14,
    Nodejs16,
    Python27,
    Python36,
    Python39,
    Java8,
    Java11,
    Php72,
    Dotnetcore21,
    Go1,
    Custom,
    CustomDebian10,
    CustomContainer,
    Unknown(String),
}

/// Language family of a runtime, used to pick debugger settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFamily {
    Nodejs,
    Python,
    Java,
    Php,
    Dotnet,
    Go,
    Custom,
}

impl Runtime {
    /// Parse runtime string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "nodejs10" => Self::Nodejs10,
            "nodejs12" => Self::Nodejs12,
            "nodejs14" => Self::Nodejs14,
            "nodejs16" => Self::Nodejs16,
            "python2.7" => Self::Python27,
            "python3" | "python3.6" => Self::Python36,
            "python3.9" => Self::Python39,
            "java8" => Self::Java8,
            "java11" => Self::Java11,
            "php7.2" => Self::Php72,
            "dotnetcore2.1" => Self::Dotnetcore21,
            "go1" => Self::Go1,
            "custom" => Self::Custom,
            "custom.debian10" => Self::CustomDebian10,
            "custom-container" => Self::CustomContainer,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Nodejs10 => "nodejs10",
            Self::Nodejs12 => "nodejs12",
            Self::Nodejs14 => "nodejs14",
            Self::Nodejs16 => "nodejs16",
            Self::Python27 => "python2.7",
            Self::Python36 => "python3",
            Self::Python39 => "python3.9",
            Self::Java8 => "java8",
            Self::Java11 => "java11",
            Self::Php72 => "php7.2",
            Self::Dotnetcore21 => "dotnetcore2.1",
            Self::Go1 => "go1",
            Self::Custom => "custom",
            Self::CustomDebian10 => "custom.debian10",
            Self::CustomContainer => "custom-container",
            Self::Unknown(name) => name,
        }
    }

    /// Name used in the runtime image repository (`runtime-<name>`).
    ///
    /// Returns `None` for runtimes without a published image.
    pub fn image_name(&self) -> Option<&'static str> {
        match self {
            Self::Nodejs10 => Some("nodejs10"),
            Self::Nodejs12 => Some("nodejs12"),
            Self::Nodejs14 => Some("nodejs14"),
            Self::Nodejs16 => Some("nodejs16"),
            Self::Python27 => Some("python2.7"),
            Self::Python36 => Some("python3.6"),
            Self::Python39 => Some("python3.9"),
            Self::Java8 => Some("java8"),
            Self::Java11 => Some("java11"),
            Self::Php72 => Some("php7.2"),
            Self::Dotnetcore21 => Some("dotnetcore2.1"),
            Self::Go1 => Some("go1"),
            Self::Custom => Some("custom"),
            Self::CustomDebian10 => Some("custom.debian10"),
            Self::CustomContainer | Self::Unknown(_) => None,
        }
    }

    pub fn is_custom_container(&self) -> bool {
        matches!(self, Self::CustomContainer)
    }

    pub fn family(&self) -> RuntimeFamily {
        match self {
            Self::Nodejs10 | Self::Nodejs12 | Self::Nodejs14 | Self::Nodejs16 => {
                RuntimeFamily::Nodejs
            }
            Self::Python27 | Self::Python36 | Self::Python39 => RuntimeFamily::Python,
            Self::Java8 | Self::Java11 => RuntimeFamily::Java,
            Self::Php72 => RuntimeFamily::Php,
            Self::Dotnetcore21 => RuntimeFamily::Dotnet,
            Self::Go1 => RuntimeFamily::Go,
            Self::Custom | Self::CustomDebian10 | Self::CustomContainer | Self::Unknown(_) => {
                RuntimeFamily::Custom
            }
        }
    }
}

impl From<String> for Runtime {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<Runtime> for String {
    fn from(runtime: Runtime) -> Self {
        runtime.as_str().to_string()
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image settings for custom-container functions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomContainerConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

/// Function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    pub name: String,
    pub runtime: Runtime,
    #[serde(default)]
    pub code_uri: Option<String>,
    /// Code location before any packaging step relocated it
    #[serde(default)]
    pub original_code_uri: Option<String>,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default)]
    pub initializer: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub custom_container_config: Option<CustomContainerConfig>,
}

fn default_handler() -> String {
    "index.handler".to_string()
}

fn default_timeout() -> u32 {
    3
}

fn default_memory_size() -> u32 {
    128
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            runtime: Runtime::Nodejs14,
            code_uri: None,
            original_code_uri: None,
            handler: default_handler(),
            initializer: None,
            timeout: default_timeout(),
            memory_size: default_memory_size(),
            environment_variables: HashMap::new(),
            layers: Vec::new(),
            custom_container_config: None,
        }
    }
}

impl FunctionConfig {
    /// Image declared by a custom-container function
    pub fn custom_container_image(&self) -> Option<&str> {
        self.custom_container_config
            .as_ref()
            .and_then(|c| c.image.as_deref())
    }
}

/// A single NAS export made available inside the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasMountPoint {
    /// `host:/remote/path`
    pub server_addr: String,
    /// Absolute path inside the container
    pub mount_dir: String,
}

impl NasMountPoint {
    /// Split the server address into host and remote path
    pub fn server_parts(&self) -> Option<(&str, &str)> {
        let (host, path) = self.server_addr.split_once(':')?;
        if host.is_empty() || !path.starts_with('/') {
            return None;
        }
        Some((host, path))
    }
}

/// Explicit NAS configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasSettings {
    #[serde(default)]
    pub user_id: Option<u32>,
    #[serde(default)]
    pub group_id: Option<u32>,
    #[serde(default)]
    pub mount_points: Vec<NasMountPoint>,
}

/// NAS configuration: either `"Auto"` or explicit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NasConfig {
    Auto(AutoNas),
    Explicit(NasSettings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoNas {
    Auto,
}

/// Mount point used for `Auto` NAS
pub const AUTO_NAS_MOUNT_DIR: &str = "/mnt/auto";

/// User and group ids `Auto` NAS runs with
pub const AUTO_NAS_ID: u32 = 10003;

impl NasConfig {
    pub fn user_id(&self) -> Option<u32> {
        match self {
            Self::Auto(_) => Some(AUTO_NAS_ID),
            Self::Explicit(settings) => settings.user_id,
        }
    }

    pub fn group_id(&self) -> Option<u32> {
        match self {
            Self::Auto(_) => Some(AUTO_NAS_ID),
            Self::Explicit(settings) => settings.group_id,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nas_config: Option<NasConfig>,
}

/// Trigger configuration attached to the invoked function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_round_trip_names() {
        assert_eq!(Runtime::from_str("python3.9"), Runtime::Python39);
        assert_eq!(Runtime::from_str("python3"), Runtime::Python36);
        assert_eq!(Runtime::Python36.image_name(), Some("python3.6"));
        assert_eq!(
            Runtime::from_str("cobol85"),
            Runtime::Unknown("cobol85".to_string())
        );
        assert!(Runtime::from_str("custom-container").is_custom_container());
        assert_eq!(Runtime::CustomContainer.image_name(), None);
    }

    #[test]
    fn test_runtime_family() {
        assert_eq!(Runtime::Nodejs16.family(), RuntimeFamily::Nodejs);
        assert_eq!(Runtime::Java11.family(), RuntimeFamily::Java);
        assert_eq!(Runtime::CustomDebian10.family(), RuntimeFamily::Custom);
    }

    #[test]
    fn test_function_config_deserialize() {
        let config: FunctionConfig = serde_json::from_str(
            r#"{
                "name": "hello",
                "runtime": "custom-container",
                "codeUri": "./code",
                "customContainerConfig": {"image": "myrepo/img:tag"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.runtime, Runtime::CustomContainer);
        assert_eq!(config.custom_container_image(), Some("myrepo/img:tag"));
        assert_eq!(config.timeout, 3);
        assert!(config.layers.is_empty());
    }

    #[test]
    fn test_nas_config_variants() {
        let auto: NasConfig = serde_json::from_str(r#""Auto""#).unwrap();
        assert_eq!(auto, NasConfig::Auto(AutoNas::Auto));
        assert_eq!(auto.user_id(), Some(AUTO_NAS_ID));

        let explicit: NasConfig = serde_json::from_str(
            r#"{"userId": 1000, "groupId": 1001,
                "mountPoints": [{"serverAddr": "nas.example.com:/share", "mountDir": "/mnt/nas"}]}"#,
        )
        .unwrap();
        match explicit {
            NasConfig::Explicit(settings) => {
                assert_eq!(settings.group_id, Some(1001));
                assert_eq!(
                    settings.mount_points[0].server_parts(),
                    Some(("nas.example.com", "/share"))
                );
            }
            NasConfig::Auto(_) => panic!("expected explicit NAS config"),
        }
    }

    #[test]
    fn test_nas_server_parts_rejects_malformed() {
        let point = NasMountPoint {
            server_addr: "nas.example.com".to_string(),
            mount_dir: "/mnt/nas".to_string(),
        };
        assert_eq!(point.server_parts(), None);

        let point = NasMountPoint {
            server_addr: "nas.example.com:share".to_string(),
            mount_dir: "/mnt/nas".to_string(),
        };
        assert_eq!(point.server_parts(), None);
    }
}
