//! Tool handlers for taskforge
//!
//! Provides the tool registry, parameter validation, execution statistics,
//! and all built-in tool implementations.

mod call;
pub mod implementations;
pub mod metadata;
pub mod path_utils;
pub mod registry;
pub mod safety;
pub mod stats;
pub mod truncation;

pub use call::{Parameters, ToolCall};
pub use implementations::register_all_tools;
pub use metadata::{ParameterType, ToolCategory, ToolMetadata, ToolParameter, ValidationResult};
pub use registry::{parse_params, ToolContext, ToolHandler, ToolRegistry, ToolResult};
pub use stats::{ExecutionMetadataManager, ToolStatistics};
