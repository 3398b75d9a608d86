//! Small helpers shared across modules.

pub mod partial_json;
pub mod text;
pub mod tool_call_assembler;

pub use partial_json::repair_partial_json;
pub use text::dedent;
pub use tool_call_assembler::ToolCallAssembler;
