//! Local function invocation engine
//!
//! Prepares a function container (staged code, mounts, image) and runs
//! invocations against it through a pluggable delegate.

pub mod archive;
pub mod context;
pub mod debug;
pub mod docker;
pub mod error;
pub mod fcignore;
pub mod function;
pub mod image;
pub mod invocation;
pub mod mount;
pub mod nas;
pub mod session;

pub use context::{DebugSettings, InvocationContext};
pub use debug::{DebugConfigWriter, DebugIde, DebugTarget};
pub use docker::{ContainerRuntimeClient, DockerClient};
pub use error::{InvokeError, MountCategory, Result};
pub use fcignore::{IgnorePredicate, IgnorePredicateBuilder, IgnoreSource};
pub use function::{FunctionConfig, NasConfig, Runtime, ServiceConfig, TriggerConfig};
pub use image::RuntimeImageLookup;
pub use invocation::{
    ContainerIdentity, DryRunDelegate, InvokeDelegate, InvokeRequest, InvokeResponse,
    PreparedContainer,
};
pub use mount::MountDescriptor;
pub use nas::NasMountResolver;
pub use session::{InvokeSession, SessionDeps, SessionOptions, SessionState};
