//! Tool schema construction errors

/// Raised while building a [`ToolDefinition`](super::ToolDefinition).
///
/// Always surfaced when the tool is declared, before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("tool `{tool}` must have a docstring")]
    MissingDocstring { tool: String },

    #[error("tool `{tool}` must have a description")]
    MissingDescription { tool: String },

    #[error("tool `{tool}`: parameter `{param}` must have a type annotation")]
    UntypedParameter { tool: String, param: String },

    #[error(
        "tool `{tool}`: parameter `{param}` does not match documented parameter `{documented}`; \
         names and order must match exactly"
    )]
    ParameterMismatch {
        tool: String,
        param: String,
        documented: String,
    },

    #[error("tool `{tool}`: documented parameter `{param}` must have a description")]
    MissingParameterDescription { tool: String, param: String },

    #[error("`{name}` is not a valid tool name")]
    InvalidName { name: String },

    #[error("tool `{tool}`: {reason}")]
    InvalidSchema { tool: String, reason: String },
}
