//! Configuration management

use anyhow::Context;
use fcstack_core::Credentials;
use fcstack_invoke::function::TriggerConfig;
use fcstack_invoke::image::{RegistryImageLookup, DEFAULT_IMAGE_VERSION, DEFAULT_REGISTRY};
use fcstack_invoke::{FunctionConfig, ServiceConfig, SessionOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_region")]
    pub region: String,

    /// Project directory that relative code paths are resolved against
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// JSON file describing the service and function to invoke
    #[serde(default)]
    pub function_file: Option<PathBuf>,

    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,

    #[serde(default)]
    pub debugger_path: Option<PathBuf>,

    #[serde(default)]
    pub disable_tmp_dir_mount: bool,

    #[serde(default)]
    pub nas_base_dir: Option<PathBuf>,

    #[serde(default)]
    pub temp_root: Option<PathBuf>,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_registry")]
    pub registry: String,

    #[serde(default = "default_image_version")]
    pub version: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            version: default_image_version(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub security_token: Option<String>,
}

/// Contents of the function file
#[derive(Debug, Deserialize)]
pub struct FunctionFile {
    pub service: ServiceConfig,
    pub function: FunctionConfig,
    #[serde(default)]
    pub trigger: Option<TriggerConfig>,
}

fn default_region() -> String {
    "cn-hangzhou".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_image_version() -> String {
    DEFAULT_IMAGE_VERSION.to_string()
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(file: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("FCSTACK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// Session options; `DISABLE_BIND_MOUNT_TMP_DIR` can also turn the
    /// temp-dir mount off
    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::from_env();
        SessionOptions {
            disable_tmp_dir_mount: self.disable_tmp_dir_mount || defaults.disable_tmp_dir_mount,
            nas_base_dir: self.nas_base_dir.clone(),
            temp_root: self.temp_root.clone().unwrap_or(defaults.temp_root),
        }
    }

    pub fn image_lookup(&self) -> RegistryImageLookup {
        RegistryImageLookup {
            registry: self.image.registry.clone(),
            version: self.image.version.clone(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        let creds = Credentials::new(
            self.credentials.account_id.clone(),
            self.credentials.access_key_id.clone(),
            self.credentials.access_key_secret.clone(),
        );
        match &self.credentials.security_token {
            Some(token) => creds.with_security_token(token.clone()),
            None => creds,
        }
    }
}

impl FunctionFile {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading function file {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing function file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");

        let config = Config::load(missing.to_str().unwrap()).unwrap();
        assert_eq!(config.image.registry, DEFAULT_REGISTRY);
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert!(config.function_file.is_none());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fcstack.toml");
        std::fs::write(
            &file,
            r#"
region = "cn-shanghai"
base_dir = "/work/app"
tmp_dir = "/work/app/.s/tmp"
temp_root = "/var/tmp/fcstack"

[image]
registry = "registry.example.com"
"#,
        )
        .unwrap();

        let config = Config::load(file.to_str().unwrap()).unwrap();
        assert_eq!(config.region, "cn-shanghai");
        assert_eq!(config.image.registry, "registry.example.com");
        assert_eq!(config.image.version, DEFAULT_IMAGE_VERSION);
        assert_eq!(
            config.session_options().temp_root,
            PathBuf::from("/var/tmp/fcstack")
        );
    }

    #[test]
    fn test_function_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("function.json");
        std::fs::write(
            &file,
            r#"{
                "service": {"name": "svc", "nasConfig": "Auto"},
                "function": {"name": "fn", "runtime": "python3.9", "codeUri": "./src"}
            }"#,
        )
        .unwrap();

        let parsed = FunctionFile::read(&file).unwrap();
        assert_eq!(parsed.service.name, "svc");
        assert!(parsed.service.nas_config.is_some());
        assert_eq!(parsed.function.code_uri.as_deref(), Some("./src"));
        assert!(parsed.trigger.is_none());
    }
}
