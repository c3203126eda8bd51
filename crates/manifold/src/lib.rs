//! manifold — a provider-agnostic runtime for LLM inference calls.
//!
//! One contract, several heterogeneous backends: conversations are held in a
//! normalized block-based representation, translated to each backend's exact
//! wire format on the way out, and aggregated back into a uniform event
//! stream on the way in.
//!
//! ```ignore
//! use futures::StreamExt;
//! use manifold::{CancellationToken, GenerateRequest, Message, Provider, StreamEvent};
//! use manifold::providers::LoremProvider;
//!
//! let provider = LoremProvider::new();
//! let req = GenerateRequest::new("lorem-fast", vec![Message::user("Hi")]);
//! let mut events = provider.stream(&req, CancellationToken::new()).await?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         StreamEvent::Delta(delta) => { /* live UI update */ }
//!         StreamEvent::Block(block) => { /* persist the finished block */ }
//!         StreamEvent::Metadata(meta) => { /* tokens, stop reason */ }
//!         StreamEvent::Error(err) => { /* classify with err.is_retryable() */ }
//!     }
//! }
//! ```
//!
//! The library is a stateless translator: it enforces nothing the backends
//! enforce themselves (validation is advisory), persists nothing, retries
//! nothing, and executes no tools — tool calls and results travel as data.

pub mod providers;

mod sse;

pub use manifold_core::*;

pub use providers::{AnthropicProvider, LoremProvider, OpenRouterProvider};
