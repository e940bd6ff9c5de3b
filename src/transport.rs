//! Remote capabilities the session reads and writes through.
//!
//! The cache treats both as opaque: payloads are decoded JSON bodies and
//! failures are [`ApiError`]s passed straight back to the caller.

use crate::cache::types::{FetchParams, Method};
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::Value;

/// Fetcher and writer capability supplied by the surrounding HTTP client.
///
/// Implementations must be thread-safe; the session shares one instance
/// across all bindings.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read `endpoint` with query `params`
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Value, ApiError>;

    /// Send a mutating request with an optional JSON body
    async fn write(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError>;
}
