//! The remote query endpoint seen by a list controller

use crate::core::query::{QueryOptions, RemotePage};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A data source answering query descriptors with pages of rows
///
/// Implementations wrap whatever transport the console talks to (REST,
/// GraphQL) or hold rows locally. The controller only relies on the
/// request/response shape: any error is reported as a network failure.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch one page of rows matching `options`
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage>;
}

#[async_trait]
impl<S: RemoteSource + ?Sized> RemoteSource for Arc<S> {
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage> {
        (**self).fetch(options).await
    }
}
