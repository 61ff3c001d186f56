//! Language-model provider clients for DeskLink.
//!
//! Exposes the `LlmClient` seam plus OpenAI- and Anthropic-compatible
//! chat-completion implementations used by the label classifier and the
//! issue content generator.

pub mod anthropic;
pub mod openai;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{AiError, ChatMessage, ChatRequest, ChatRole, LlmClient};
