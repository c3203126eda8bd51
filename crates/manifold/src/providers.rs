//! Backend implementations of the [`Provider`](manifold_core::Provider)
//! contract.

pub mod anthropic;
pub mod lorem;
pub mod openrouter;

pub use anthropic::AnthropicProvider;
pub use lorem::LoremProvider;
pub use openrouter::OpenRouterProvider;
