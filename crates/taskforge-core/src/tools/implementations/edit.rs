//! str-replace-editor tool - Unique string replacement or line insertion

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use similar::TextDiff;
use std::path::Path;
use tokio::fs;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::path_utils::resolve_workspace_path;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

pub struct StrReplaceEditorTool;

#[derive(Deserialize)]
struct Params {
    command: String,
    path: String,
    #[serde(default)]
    old_str: Option<String>,
    #[serde(default)]
    new_str: Option<String>,
    #[serde(default)]
    insert_line: Option<usize>,
}

#[async_trait]
impl ToolHandler for StrReplaceEditorTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "str-replace-editor",
            "Edit a file. 'str_replace' replaces a unique occurrence of old_str with new_str; \
             'insert' inserts new_str after line insert_line (0 inserts at the top).",
            ToolCategory::File,
        )
        .required("command", ParameterType::String, "'str_replace' or 'insert'")
        .required("path", ParameterType::String, "File to edit")
        .optional("old_str", ParameterType::String, "Text to replace (str_replace)")
        .optional("new_str", ParameterType::String, "Replacement or inserted text")
        .optional("insert_line", ParameterType::Integer, "Line to insert after (insert)")
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let has = |key: &str| params.get(key).is_some_and(|v| !v.is_null());
        let mut extra = Vec::new();
        match params.get("command").and_then(|v| v.as_str()) {
            Some("str_replace") => {
                if !has("old_str") {
                    extra.push("Command 'str_replace' requires 'old_str'".to_string());
                } else if params["old_str"].as_str() == Some("") {
                    extra.push("Parameter 'old_str' must not be empty".to_string());
                }
                if !has("new_str") {
                    extra.push("Command 'str_replace' requires 'new_str'".to_string());
                }
            }
            Some("insert") => {
                if !has("insert_line") {
                    extra.push("Command 'insert' requires 'insert_line'".to_string());
                } else if params["insert_line"].as_i64().is_some_and(|n| n < 0) {
                    extra.push("Parameter 'insert_line' must not be negative".to_string());
                }
                if !has("new_str") {
                    extra.push("Command 'insert' requires 'new_str'".to_string());
                }
            }
            Some(other) => extra.push(format!(
                "Parameter 'command' must be 'str_replace' or 'insert', got '{}'",
                other
            )),
            None => {}
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path = match resolve_workspace_path(ctx.working_dir(), &params.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::error(format!("File not found: {}", params.path))
            }
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let new_str = params.new_str.unwrap_or_default();
        let edited = match params.command.as_str() {
            "insert" => insert_after(&content, params.insert_line.unwrap_or(0), &new_str),
            _ => replace_unique(&content, params.old_str.as_deref().unwrap_or(""), &new_str),
        };
        let new_content = match edited {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e),
        };

        if let Err(e) = fs::write(&path, &new_content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        ToolResult::success_data(json!({
            "message": format!("Applied {} to {}", params.command, params.path),
            "diff": unified_diff(&content, &new_content, &path),
        }))
    }
}

fn replace_unique(content: &str, old: &str, new: &str) -> Result<String, String> {
    match content.matches(old).count() {
        0 => Err(format!("String not found in file: {:?}", old)),
        1 => Ok(content.replacen(old, new, 1)),
        n => Err(format!(
            "String found {} times; provide more context to make it unique",
            n
        )),
    }
}

fn insert_after(content: &str, line: usize, text: &str) -> Result<String, String> {
    let mut lines: Vec<&str> = content.lines().collect();
    if line > lines.len() {
        return Err(format!(
            "insert_line {} is past the end of the file ({} lines)",
            line,
            lines.len()
        ));
    }
    lines.splice(line..line, text.lines());

    let mut out = lines.join("\n");
    if content.ends_with('\n') || content.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn unified_diff(old: &str, new: &str, path: &Path) -> String {
    let diff = TextDiff::from_lines(old, new);
    let hunks: String = diff
        .unified_diff()
        .context_radius(3)
        .iter_hunks()
        .map(|hunk| hunk.to_string())
        .collect();
    if hunks.is_empty() {
        return String::new();
    }
    format!("--- {}\n+++ {}\n{}", path.display(), path.display(), hunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    fn setup(content: &str) -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("User.kt"), content).unwrap();
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn replaces_unique_match_and_returns_diff() {
        let (dir, ctx) = setup("data class User(var name: String)\n");
        let call = ToolCall::new("str-replace-editor")
            .with_param("command", "str_replace")
            .with_param("path", "User.kt")
            .with_param("old_str", "var name")
            .with_param("new_str", "val name");

        let result = StrReplaceEditorTool.execute(call.parameters(), &ctx).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.output.contains("+data class User(val name: String)"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("User.kt")).unwrap(),
            "data class User(val name: String)\n"
        );
    }

    #[tokio::test]
    async fn ambiguous_match_leaves_file_untouched() {
        let (dir, ctx) = setup("a\na\n");
        let call = ToolCall::new("str-replace-editor")
            .with_param("command", "str_replace")
            .with_param("path", "User.kt")
            .with_param("old_str", "a")
            .with_param("new_str", "b");

        let result = StrReplaceEditorTool.execute(call.parameters(), &ctx).await;

        assert!(!result.success);
        assert!(result.error_message().contains("2 times"));
        assert_eq!(std::fs::read_to_string(dir.path().join("User.kt")).unwrap(), "a\na\n");
    }

    #[tokio::test]
    async fn inserts_after_line() {
        let (dir, ctx) = setup("first\nthird\n");
        let call = ToolCall::new("str-replace-editor")
            .with_param("command", "insert")
            .with_param("path", "User.kt")
            .with_param("insert_line", 1)
            .with_param("new_str", "second");

        assert!(StrReplaceEditorTool.execute(call.parameters(), &ctx).await.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("User.kt")).unwrap(),
            "first\nsecond\nthird\n"
        );
    }

    #[tokio::test]
    async fn command_specific_requirements_are_validated() {
        let (_dir, ctx) = setup("x\n");
        let call = ToolCall::new("str-replace-editor")
            .with_param("command", "insert")
            .with_param("path", "User.kt");

        let result = StrReplaceEditorTool.execute(call.parameters(), &ctx).await;

        assert_eq!(result.error_code.as_deref(), Some("invalid_parameters"));
        assert!(result.error_message().contains("insert_line"));
        assert!(result.error_message().contains("new_str"));
    }

    #[test]
    fn insert_past_end_is_rejected() {
        assert!(insert_after("a\n", 5, "b").is_err());
        assert_eq!(insert_after("", 0, "b").unwrap(), "b\n");
    }
}
