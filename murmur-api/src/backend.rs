use std::sync::Arc;

use async_trait::async_trait;

use crate::ApiError;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// The one capability the client needs from its transport.
///
/// Authentication and project scoping of the transport are the implementor's business; `path`
/// already starts with `/{project}`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ApiError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ApiError> {
        (**self).request(method, path, params, body).await
    }
}
