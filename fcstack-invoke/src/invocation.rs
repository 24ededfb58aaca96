//! Invocation requests, responses and the transport seam

use crate::context::InvocationContext;
use crate::error::Result;
use crate::mount::{DockerUser, MountDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use fcstack_core::RequestId;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Invocation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationType {
    /// Wait for the function result
    #[default]
    Sync,
    /// Fire and forget
    Async,
}

impl InvocationType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sync" | "requestresponse" => Some(Self::Sync),
            "async" | "event" => Some(Self::Async),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "Sync",
            Self::Async => "Async",
        }
    }
}

/// A single invocation request
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub request_id: RequestId,
    pub invocation_type: InvocationType,
    pub event: Bytes,
}

impl InvokeRequest {
    pub fn new(event: impl Into<Bytes>) -> Self {
        Self {
            request_id: RequestId::new(),
            invocation_type: InvocationType::Sync,
            event: event.into(),
        }
    }
}

/// Filled in by the delegate
#[derive(Debug, Default)]
pub struct InvokeResponse {
    pub status_code: u16,
    pub payload: Option<Bytes>,
    pub function_error: Option<String>,
    pub log_result: Option<String>,
}

impl InvokeResponse {
    pub fn success(&mut self, payload: impl Into<Bytes>) {
        self.status_code = 200;
        self.payload = Some(payload.into());
        self.function_error = None;
    }
}

/// Container identity chosen at init
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerIdentity {
    pub name: String,
    pub image: String,
}

/// Everything the delegate needs to start the function container
#[derive(Debug, Clone, Copy)]
pub struct PreparedContainer<'a> {
    pub context: &'a InvocationContext,
    pub container: &'a ContainerIdentity,
    pub mounts: &'a [MountDescriptor],
    pub docker_user: DockerUser,
}

/// Forwards a request into the function container
#[async_trait]
pub trait InvokeDelegate: Send + Sync {
    async fn invoke(
        &self,
        prepared: PreparedContainer<'_>,
        request: &InvokeRequest,
        response: &mut InvokeResponse,
    ) -> Result<()>;
}

#[async_trait]
impl<T: InvokeDelegate + ?Sized> InvokeDelegate for Arc<T> {
    async fn invoke(
        &self,
        prepared: PreparedContainer<'_>,
        request: &InvokeRequest,
        response: &mut InvokeResponse,
    ) -> Result<()> {
        (**self).invoke(prepared, request, response).await
    }
}

/// Container plan reported by [`DryRunDelegate`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPlan<'a> {
    pub request_id: &'a str,
    pub invocation_type: &'static str,
    pub service: &'a str,
    pub function: &'a str,
    pub runtime: &'a str,
    pub container: &'a ContainerIdentity,
    pub user: String,
    pub mounts: &'a [MountDescriptor],
    pub binds: Vec<String>,
}

/// Does not run anything; answers with the container plan as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDelegate;

#[async_trait]
impl InvokeDelegate for DryRunDelegate {
    async fn invoke(
        &self,
        prepared: PreparedContainer<'_>,
        request: &InvokeRequest,
        response: &mut InvokeResponse,
    ) -> Result<()> {
        let plan = ContainerPlan {
            request_id: request.request_id.as_str(),
            invocation_type: request.invocation_type.as_str(),
            service: prepared.context.service_name(),
            function: prepared.context.function_name(),
            runtime: prepared.context.runtime().as_str(),
            container: prepared.container,
            user: prepared.docker_user.to_string(),
            mounts: prepared.mounts,
            binds: prepared.mounts.iter().map(MountDescriptor::to_bind).collect(),
        };

        info!(
            request_id = %request.request_id,
            container = %prepared.container.name,
            "Dry run, container not started"
        );

        let body = serde_json::to_vec_pretty(&plan)
            .map_err(|e| crate::error::InvokeError::Invocation(e.to_string()))?;
        response.success(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_type_from_str() {
        assert_eq!(InvocationType::from_str("Sync"), Some(InvocationType::Sync));
        assert_eq!(
            InvocationType::from_str("Event"),
            Some(InvocationType::Async)
        );
        assert_eq!(InvocationType::from_str("DryRun"), None);
    }

    #[test]
    fn test_success_clears_function_error() {
        let mut response = InvokeResponse {
            function_error: Some("Unhandled".to_string()),
            ..Default::default()
        };
        response.success("\"ok\"");

        assert_eq!(response.status_code, 200);
        assert!(response.function_error.is_none());
        assert_eq!(response.payload.as_deref(), Some(&b"\"ok\""[..]));
    }
}
