//! Backend seam
//!
//! The pipeline only needs one non-streaming chat-completion call per
//! request. Transport failures are errors; any HTTP answer, success or not,
//! is an [`UpstreamReply`].

use crate::error::Result;
use crate::types::{ChatRequest, UpstreamReply};
use async_trait::async_trait;
use std::sync::Arc;

/// A chat-completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue one chat-completion call and return the raw answer
    async fn complete(&self, request: &ChatRequest) -> Result<UpstreamReply>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn complete(&self, request: &ChatRequest) -> Result<UpstreamReply> {
        (**self).complete(request).await
    }
}
