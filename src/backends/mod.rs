//! Outbound HTTP client for the single configured upstream.
//!
//! Unlike the reference codebase's `BackendClient` enum dispatching across
//! providers chosen per-request, this service has exactly one upstream, so
//! there is exactly one adapter: [`openrouter::OpenRouterClient`].

mod openrouter;

pub use openrouter::OpenRouterClient;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A `Send`-able, heap-allocated upstream SSE byte stream, forwarded to the
/// streaming translator in [`crate::stream`].
pub type SseStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;
