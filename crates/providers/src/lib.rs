//! LLM provider adapters.
//!
//! Each adapter translates the backend-agnostic [`GenerationRequest`] into
//! one provider's wire format and parses its SSE stream back into
//! [`StreamEvent`]s. The [`ProviderRegistry`] instantiates adapters from
//! config and resolves the provider an agent names, falling back to a
//! diagnostic adapter for unknown ids.
//!
//! [`StreamEvent`]: parlor_domain::stream::StreamEvent

pub mod anthropic;
pub mod openai;
pub mod registry;
pub mod selector;
pub mod traits;

mod sse;
mod util;

pub use registry::ProviderRegistry;
pub use selector::{Dialect, UnsupportedProvider};
pub use traits::{ChatProvider, GenerationRequest};
