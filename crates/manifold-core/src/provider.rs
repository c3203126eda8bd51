//! The provider contract every backend implements.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendId;
use crate::error::Result;
use crate::request::GenerateRequest;
use crate::response::GenerateResponse;
use crate::streaming::EventStream;

/// A backend capable of serving generation requests.
///
/// `cancel` is the caller's cancellation signal and the sole cancellation
/// source; per-call timeouts are built by the caller wrapping the token.
/// Dropping a returned [`EventStream`] also stops its producer.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a complete response (blocking until the backend finishes).
    async fn generate(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse>;

    /// Generate a streaming response.
    ///
    /// Pre-stream failures (unsupported model, malformed conversation,
    /// rejected HTTP handshake) surface synchronously as `Err`. Once a stream
    /// is returned, failures arrive as a final [`StreamEvent::Error`]
    /// followed by channel close.
    ///
    /// [`StreamEvent::Error`]: crate::StreamEvent::Error
    async fn stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream>;

    /// The backend's identity.
    fn name(&self) -> BackendId;

    /// Whether this backend can serve the given model identifier.
    fn supports_model(&self, model: &str) -> bool;
}
