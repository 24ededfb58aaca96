//! Invocation session lifecycle
//!
//! A session prepares a function container once (code staging, mounts,
//! image) and then runs any number of invocations through its delegate. The
//! staged code directory is removed after every invocation, whatever the
//! outcome.

use crate::archive::stage_code_if_necessary;
use crate::context::InvocationContext;
use crate::debug::{DebugConfigWriter, DebugIde, DebugTarget, PyCharmTipsWriter, VsCodeLaunchWriter};
use crate::docker::ContainerRuntimeClient;
use crate::error::{InvokeError, Result};
use crate::fcignore::{select_ignore_source, FcIgnoreBuilder, IgnorePredicate, IgnorePredicateBuilder};
use crate::image::{provision_image, RegistryImageLookup, RuntimeImageLookup};
use crate::invocation::{
    ContainerIdentity, InvokeDelegate, InvokeRequest, InvokeResponse, PreparedContainer,
};
use crate::mount::{
    assemble_mounts, host_ids, layer_cache_path, resolve_code_mount, resolve_debugger_mount,
    resolve_docker_user, resolve_layer_mount, resolve_passwd_mount, resolve_tmp_dir_mount,
    transform_mounts_for_toolbox, DockerUser, MountDescriptor, MountParts,
};
use crate::nas::{LocalNasResolver, NasMountResolver, DEFAULT_NAS_PATH_SUFFIX};
use fcstack_core::is_true_value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable that turns off the `/tmp` bind mount
pub const DISABLE_TMP_DIR_MOUNT_ENV: &str = "DISABLE_BIND_MOUNT_TMP_DIR";

/// Session-wide settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Skip the temp-directory mount even when a temp dir is configured
    pub disable_tmp_dir_mount: bool,
    /// Local root emulating NAS exports; defaults to `<base_dir>/.s/nas`.
    /// Relative paths here and in `temp_root` resolve against the base dir.
    pub nas_base_dir: Option<PathBuf>,
    /// Root for staged code and generated passwd files
    pub temp_root: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            disable_tmp_dir_mount: false,
            nas_base_dir: None,
            temp_root: std::env::temp_dir().join("fcstack"),
        }
    }
}

impl SessionOptions {
    /// Defaults, with the temp-dir toggle read from the environment
    pub fn from_env() -> Self {
        let disable_tmp_dir_mount = std::env::var(DISABLE_TMP_DIR_MOUNT_ENV)
            .map(|value| is_true_value(&value))
            .unwrap_or(false);

        Self {
            disable_tmp_dir_mount,
            ..Self::default()
        }
    }
}

/// Collaborators injected into a session
pub struct SessionDeps<D> {
    pub runtime_client: Arc<dyn ContainerRuntimeClient>,
    pub image_lookup: Arc<dyn RuntimeImageLookup>,
    pub nas_resolver: Arc<dyn NasMountResolver>,
    pub vscode_writer: Arc<dyn DebugConfigWriter>,
    pub pycharm_writer: Arc<dyn DebugConfigWriter>,
    pub ignore_builder: Arc<dyn IgnorePredicateBuilder>,
    pub delegate: D,
}

impl<D: InvokeDelegate> SessionDeps<D> {
    /// Default collaborators around a container runtime and a delegate
    pub fn new(runtime_client: Arc<dyn ContainerRuntimeClient>, delegate: D) -> Self {
        Self {
            runtime_client,
            image_lookup: Arc::new(RegistryImageLookup::default()),
            nas_resolver: Arc::new(LocalNasResolver),
            vscode_writer: Arc::new(VsCodeLaunchWriter),
            pycharm_writer: Arc::new(PyCharmTipsWriter),
            ignore_builder: Arc::new(FcIgnoreBuilder),
            delegate,
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Invoking,
    Cleaning,
    /// Initialization failed; the session cannot be used again
    Failed,
}

struct Prepared {
    container: ContainerIdentity,
    mounts: Vec<MountDescriptor>,
    docker_user: DockerUser,
}

/// Local invocation session for one function
pub struct InvokeSession<D: InvokeDelegate> {
    context: InvocationContext,
    options: SessionOptions,
    deps: SessionDeps<D>,
    state: SessionState,
    prepared: Option<Prepared>,
    staged_code_dir: Option<PathBuf>,
}

impl<D: InvokeDelegate> InvokeSession<D> {
    pub fn new(context: InvocationContext, options: SessionOptions, deps: SessionDeps<D>) -> Self {
        Self {
            context,
            options,
            deps,
            state: SessionState::Uninitialized,
            prepared: None,
            staged_code_dir: None,
        }
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mounts(&self) -> Option<&[MountDescriptor]> {
        self.prepared.as_ref().map(|p| p.mounts.as_slice())
    }

    pub fn container(&self) -> Option<&ContainerIdentity> {
        self.prepared.as_ref().map(|p| &p.container)
    }

    pub fn staged_code_dir(&self) -> Option<&Path> {
        self.staged_code_dir.as_deref()
    }

    /// Prepare the container. Calls after a successful init do nothing.
    pub async fn init(&mut self) -> Result<()> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Failed => return Err(InvokeError::SessionUnusable),
            _ => return Ok(()),
        }

        self.state = SessionState::Initializing;
        match self.prepare().await {
            Ok(prepared) => {
                info!(
                    container = %prepared.container.name,
                    image = %prepared.container.image,
                    mounts = prepared.mounts.len(),
                    "Invocation session ready"
                );
                self.prepared = Some(prepared);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(
                    function = %self.context.function_name(),
                    error = %e,
                    "Invocation session initialization failed"
                );
                self.state = SessionState::Failed;
                if let Err(cleanup) = self.cleanup_staged_code().await {
                    warn!(error = %cleanup, "Failed to clean staged code after init failure");
                }
                Err(e)
            }
        }
    }

    async fn prepare(&mut self) -> Result<Prepared> {
        let ctx = &self.context;
        let deps = &self.deps;
        let options = &self.options;

        info!(
            scope = %ctx.account_region(),
            service = %ctx.service_name(),
            function = %ctx.function_name(),
            runtime = %ctx.runtime(),
            "Initializing invocation session"
        );

        let nas_config = ctx.service.nas_config.as_ref();
        let docker_user = resolve_docker_user(nas_config, host_ids());
        let nas_base_dir = ctx.resolve(
            options
                .nas_base_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_NAS_PATH_SUFFIX)),
        );
        let temp_root = ctx.resolve(&options.temp_root);

        let (nas, debugger, passwd) = tokio::try_join!(
            deps.nas_resolver.resolve(
                &ctx.base_dir,
                ctx.service_name(),
                nas_config,
                &nas_base_dir
            ),
            resolve_debugger_mount(ctx.debugger_path.as_deref()),
            resolve_passwd_mount(docker_user, &temp_root),
        )?;

        let staged = stage_code_if_necessary(ctx.code_uri.as_deref(), &temp_root).await?;
        self.staged_code_dir.clone_from(&staged);

        let code = match staged.as_deref().or(ctx.code_uri.as_deref()) {
            Some(code_path) => Some(resolve_code_mount(code_path).await?),
            None => None,
        };

        let layer = if ctx.function.layers.is_empty() {
            None
        } else {
            let cache = layer_cache_path(ctx.base_dir(), ctx.service_name(), ctx.function_name());
            Some(resolve_layer_mount(&cache).await?)
        };

        let tmp_dir = if options.disable_tmp_dir_mount {
            debug!("Temp dir mount disabled");
            None
        } else {
            resolve_tmp_dir_mount(ctx.tmp_dir.as_deref()).await?
        };

        let mut mounts = assemble_mounts(MountParts {
            code,
            nas,
            passwd: Some(passwd),
            layer,
            tmp_dir,
            debugger,
        });

        if !deps.runtime_client.supports_native_bind_mounts().await? {
            info!("Docker Toolbox detected, rewriting mount paths");
            mounts = transform_mounts_for_toolbox(mounts);
        }

        debug!(
            mounts = %serde_json::to_string_pretty(&mounts).unwrap_or_default(),
            "docker mounts"
        );

        let name = deps.runtime_client.generate_container_name();
        let image = provision_image(
            &ctx.function,
            deps.image_lookup.as_ref(),
            deps.runtime_client.as_ref(),
        )
        .await?;

        Ok(Prepared {
            container: ContainerIdentity { name, image },
            mounts,
            docker_user,
        })
    }

    /// Run one invocation, initializing first if needed.
    ///
    /// The staged code dir is always cleaned up afterwards; a cleanup failure
    /// is logged and never replaces the delegate's result.
    pub async fn invoke(
        &mut self,
        request: &InvokeRequest,
        response: &mut InvokeResponse,
    ) -> Result<()> {
        self.init().await?;

        self.state = SessionState::Invoking;
        let outcome = self.run_invocation(request, response).await;

        self.state = SessionState::Cleaning;
        self.after_invoke().await;
        self.state = SessionState::Ready;

        if let Err(e) = &outcome {
            warn!(request_id = %request.request_id, error = %e, "Invocation failed");
        }
        outcome
    }

    async fn run_invocation(
        &mut self,
        request: &InvokeRequest,
        response: &mut InvokeResponse,
    ) -> Result<()> {
        self.before_invoke().await?;
        self.set_debug_ide_config().await;

        let prepared = self.prepared.as_ref().ok_or(InvokeError::SessionUnusable)?;
        let container = PreparedContainer {
            context: &self.context,
            container: &prepared.container,
            mounts: &prepared.mounts,
            docker_user: prepared.docker_user,
        };

        debug!(
            request_id = %request.request_id,
            container = %prepared.container.name,
            "Invoking function"
        );
        self.deps.delegate.invoke(container, request, response).await
    }

    /// Extension point run before every invocation
    async fn before_invoke(&mut self) -> Result<()> {
        Ok(())
    }

    async fn set_debug_ide_config(&self) {
        let debug = &self.context.debug;
        let (Some(port), Some(ide)) = (debug.port, debug.ide.as_ref()) else {
            return;
        };

        let writer = match ide {
            DebugIde::VsCode => &self.deps.vscode_writer,
            DebugIde::PyCharm => &self.deps.pycharm_writer,
            DebugIde::Unsupported(name) => {
                debug!(ide = %name, "Unsupported debug IDE, skipping debug config");
                return;
            }
        };

        let target = DebugTarget {
            base_dir: self.context.base_dir.clone(),
            service_name: self.context.service_name().to_string(),
            function_name: self.context.function_name().to_string(),
            runtime: self.context.runtime().clone(),
            original_code_dir: self.context.original_code_dir(),
            debug_port: port,
        };
        if let Err(e) = writer.write(&target).await {
            warn!(ide = %ide.as_str(), error = %e, "Failed to write debug IDE config");
        }
    }

    async fn after_invoke(&mut self) {
        if let Err(e) = self.cleanup_staged_code().await {
            warn!(error = %e, "Failed to clean staged code dir");
        }
    }

    /// Delete the staged code directory, if any. Safe to call repeatedly.
    pub async fn cleanup_staged_code(&mut self) -> Result<()> {
        let Some(dir) = self.staged_code_dir.as_ref() else {
            return Ok(());
        };

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(InvokeError::Cleanup {
                    path: dir.clone(),
                    source,
                })
            }
        }

        info!(dir = %dir.display(), "Cleaned tmp code dir");
        self.staged_code_dir = None;
        Ok(())
    }

    /// Predicate excluding files from the function code
    pub async fn resolve_ignore_predicate(&self) -> Result<IgnorePredicate> {
        let ctx = &self.context;
        let code_uri = ctx.code_uri.clone().unwrap_or_else(|| ctx.base_dir.clone());
        let original = ctx.original_or_code_uri().unwrap_or_else(|| code_uri.clone());

        let source = select_ignore_source(&ctx.base_dir, &code_uri, &original).await;
        self.deps.ignore_builder.build(&source, ctx.runtime())
    }
}

impl<D: InvokeDelegate> Drop for InvokeSession<D> {
    fn drop(&mut self) {
        // Last resort for sessions dropped mid-invocation.
        if let Some(dir) = self.staged_code_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "Failed to remove staged code dir on drop");
                }
            }
        }
    }
}
