//! Prompt templates and per-call dynamic configuration.

pub mod dynamic;
pub mod template;

pub use dynamic::DynamicConfig;
pub use template::{format_text, PromptTemplate, TemplateArgs, TemplateValue};
