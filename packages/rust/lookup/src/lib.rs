//! External lookup providers.
//!
//! This crate provides:
//! - [`LookupProvider`]: the per-record lookup seam the worker pool calls
//! - [`HttpLookupProvider`]: fetches a vendor support page and extracts the
//!   warranty text with a CSS selector

pub mod http;

use async_trait::async_trait;

use assetenrich_shared::Result;

pub use http::HttpLookupProvider;

/// Looks up the raw warranty text for a single serial number.
///
/// Implementations may be slow or flaky. They must not retry on their own;
/// a failure is reported as [`assetenrich_shared::EnrichError::Lookup`] and
/// the caller decides what to do with it.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Fetch the raw, unparsed date text for `lookup_key`.
    async fn fetch(&self, lookup_key: &str) -> Result<String>;

    /// Human-readable provider name for tracing.
    fn name(&self) -> &str;
}
