//! Built-in tool handlers
//!
//! File tools:
//! - save-file: Create/overwrite files
//! - view: Read a file (range, regex filter) or list a directory
//! - str-replace-editor: Unique string replacement or line insertion
//! - remove-files: Delete files
//!
//! Process tools:
//! - launch-process: Run a shell command, blocking or in the background
//! - read-process / kill-process / list-processes: Manage background processes
//!
//! Network and repository tools:
//! - web-fetch, web-search, codebase-retrieval

pub mod codebase_retrieval;
pub mod edit;
pub mod launch_process;
pub mod processes;
pub mod remove_files;
pub mod save_file;
pub mod view;
pub mod web_fetch;
pub mod web_search;

pub use codebase_retrieval::CodebaseRetrievalTool;
pub use edit::StrReplaceEditorTool;
pub use launch_process::LaunchProcessTool;
pub use processes::{KillProcessTool, ListProcessesTool, ReadProcessTool};
pub use remove_files::RemoveFilesTool;
pub use save_file::SaveFileTool;
pub use view::ViewTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::sync::Arc;

use crate::tools::registry::ToolRegistry;

/// Register all built-in tools
pub async fn register_all_tools(registry: &ToolRegistry) {
    registry.register(Arc::new(SaveFileTool)).await;
    registry.register(Arc::new(ViewTool)).await;
    registry.register(Arc::new(StrReplaceEditorTool)).await;
    registry.register(Arc::new(RemoveFilesTool)).await;
    registry.register(Arc::new(LaunchProcessTool)).await;
    registry.register(Arc::new(ReadProcessTool)).await;
    registry.register(Arc::new(KillProcessTool)).await;
    registry.register(Arc::new(ListProcessesTool)).await;
    registry.register(Arc::new(WebFetchTool)).await;
    registry.register(Arc::new(WebSearchTool)).await;
    registry.register(Arc::new(CodebaseRetrievalTool)).await;
}
