//! Core data types shared by every provider.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`MessageRole`] | Message role (system, user, assistant, tool) |
//! | [`ToolCall`] | Tool invocation normalized from a provider response |
//! | [`ToolCallDelta`] | Streamed fragment of a tool invocation |
//! | [`Usage`] | Input/output token counts |

pub mod message;
pub mod tool;
pub mod usage;

pub use message::{ContentBlock, Message, MessageContent, MessageRole};
pub use tool::{ToolCall, ToolCallDelta};
pub use usage::Usage;
