// Evidence tool system
//
// Uniform invocation surface over heterogeneous evidence sources: static
// analysis, commit history, and bounded file reads.

pub mod file_reader;
pub mod git_history;
pub mod linter;
pub mod registry;
pub mod types;

pub use file_reader::FileReaderTool;
pub use git_history::GitHistoryTool;
pub use linter::LinterTool;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use types::{ToolDefinition, ToolInputSchema, ToolResult};
