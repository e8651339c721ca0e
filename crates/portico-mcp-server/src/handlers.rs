//! Handler traits implemented by server applications.
//!
//! Each registered entity carries its own handler; the registry
//! resolves the entity, validates inputs, and invokes it. Handlers
//! receive the engine's [`RequestContext`] for cancellation checks,
//! progress emission, and peer access.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use portico_mcp_core::error::Result;
use portico_mcp_core::types::{
    GetPromptResponse, ReadResourceResponse, TemplateBindings, ToolResult,
};
use portico_mcp_engine::RequestContext;

/// Executes one tool. Arguments have already been validated against
/// the tool's input schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value, ctx: RequestContext) -> Result<ToolResult>;
}

/// Reads a concrete resource or a template-resolved one. For template
/// reads, `bindings` holds the variables extracted from the URI.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(
        &self,
        uri: &str,
        bindings: TemplateBindings,
        ctx: RequestContext,
    ) -> Result<ReadResourceResponse>;
}

/// Renders one prompt. Required arguments are present; extras may be.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        arguments: HashMap<String, String>,
        ctx: RequestContext,
    ) -> Result<GetPromptResponse>;
}

type BoxedFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send>>;

struct FnToolHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value, RequestContext) -> BoxedFuture<ToolResult> + Send + Sync,
{
    async fn call(&self, arguments: Value, ctx: RequestContext) -> Result<ToolResult> {
        (self.0)(arguments, ctx).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_fn<F, Fut>(f: F) -> std::sync::Arc<dyn ToolHandler>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolResult>> + Send + 'static,
{
    std::sync::Arc::new(FnToolHandler(move |arguments, ctx| {
        Box::pin(f(arguments, ctx)) as BoxedFuture<ToolResult>
    }))
}

struct FnResourceHandler<F>(F);

#[async_trait]
impl<F> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, TemplateBindings, RequestContext) -> BoxedFuture<ReadResourceResponse>
        + Send
        + Sync,
{
    async fn read(
        &self,
        uri: &str,
        bindings: TemplateBindings,
        ctx: RequestContext,
    ) -> Result<ReadResourceResponse> {
        (self.0)(uri.to_string(), bindings, ctx).await
    }
}

/// Wrap an async closure as a [`ResourceHandler`].
pub fn resource_fn<F, Fut>(f: F) -> std::sync::Arc<dyn ResourceHandler>
where
    F: Fn(String, TemplateBindings, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ReadResourceResponse>> + Send + 'static,
{
    std::sync::Arc::new(FnResourceHandler(move |uri, bindings, ctx| {
        Box::pin(f(uri, bindings, ctx)) as BoxedFuture<ReadResourceResponse>
    }))
}

struct FnPromptHandler<F>(F);

#[async_trait]
impl<F> PromptHandler for FnPromptHandler<F>
where
    F: Fn(HashMap<String, String>, RequestContext) -> BoxedFuture<GetPromptResponse> + Send + Sync,
{
    async fn get(
        &self,
        arguments: HashMap<String, String>,
        ctx: RequestContext,
    ) -> Result<GetPromptResponse> {
        (self.0)(arguments, ctx).await
    }
}

/// Wrap an async closure as a [`PromptHandler`].
pub fn prompt_fn<F, Fut>(f: F) -> std::sync::Arc<dyn PromptHandler>
where
    F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<GetPromptResponse>> + Send + 'static,
{
    std::sync::Arc::new(FnPromptHandler(move |arguments, ctx| {
        Box::pin(f(arguments, ctx)) as BoxedFuture<GetPromptResponse>
    }))
}
