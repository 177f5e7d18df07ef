//! view tool - Read a file or list a directory

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::path_utils::{display_relative, resolve_workspace_path};
use crate::tools::registry::ToolHandler;
use crate::tools::truncation::{truncate_output, Keep};
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

const LIST_DEPTH: usize = 2;
const LIST_LIMIT: usize = 500;

pub struct ViewTool;

#[derive(Deserialize)]
struct Params {
    path: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    view_range: Option<Vec<i64>>,
    #[serde(default)]
    search_query_regex: Option<String>,
}

#[async_trait]
impl ToolHandler for ViewTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "view",
            "View a file with line numbers, optionally limited to a line range or to lines \
             matching a regex, or list a directory two levels deep.",
            ToolCategory::File,
        )
        .required("path", ParameterType::String, "File or directory path")
        .optional("type", ParameterType::String, "'file' or 'directory' (inferred when omitted)")
        .optional(
            "view_range",
            ParameterType::Array,
            "[start, end] 1-based inclusive line range; end -1 means end of file",
        )
        .optional(
            "search_query_regex",
            ParameterType::String,
            "Only show lines matching this regex",
        )
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if let Some(kind) = params.get("type").and_then(|v| v.as_str()) {
            if kind != "file" && kind != "directory" {
                extra.push(format!("Parameter 'type' must be 'file' or 'directory', got '{}'", kind));
            }
        }
        if let Some(range) = params.get("view_range").and_then(|v| v.as_array()) {
            let valid = range.len() == 2 && range.iter().all(|v| v.is_i64());
            if !valid {
                extra.push("Parameter 'view_range' must be two integers".to_string());
            }
        }
        if let Some(pattern) = params.get("search_query_regex").and_then(|v| v.as_str()) {
            if let Err(e) = Regex::new(pattern) {
                extra.push(format!("Parameter 'search_query_regex' is not a valid regex: {}", e));
            }
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
        if !path.exists() {
            return ToolResult::error(format!("File not found: {}", params.path));
        }

        let is_dir = match params.kind.as_deref() {
            Some("directory") => true,
            Some(_) => false,
            None => path.is_dir(),
        };
        if is_dir {
            let root = ctx.working_dir().to_path_buf();
            return match tokio::task::spawn_blocking(move || list_directory(&root, &path)).await {
                Ok(listing) => ToolResult::success(listing),
                Err(e) => ToolResult::error(format!("Directory listing failed: {}", e)),
            };
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        let regex = match params.search_query_regex.as_deref().map(Regex::new).transpose() {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Invalid regex: {}", e)),
        };

        let range = params.view_range.as_deref().and_then(|r| match r {
            [start, end] => Some((*start, *end)),
            _ => None,
        });

        ToolResult::success(truncate_output(
            &render_lines(&content, range, regex.as_ref()),
            Keep::Head,
        ))
    }
}

/// Number the selected lines like `cat -n`
fn render_lines(content: &str, range: Option<(i64, i64)>, filter: Option<&Regex>) -> String {
    let total = content.lines().count() as i64;
    let (start, end) = match range {
        Some((start, end)) => (start.max(1), if end < 0 { total } else { end.min(total) }),
        None => (1, total),
    };

    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i as i64 + 1, line))
        .filter(|(n, _)| *n >= start && *n <= end)
        .filter(|(_, line)| filter.map_or(true, |re| re.is_match(line)))
        .map(|(n, line)| format!("{:>6}\t{}", n, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_directory(root: &Path, dir: &Path) -> String {
    let walker = ignore::WalkBuilder::new(dir)
        .max_depth(Some(LIST_DEPTH))
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut lines = Vec::new();
    for entry in walker.flatten().skip(1) {
        if lines.len() >= LIST_LIMIT {
            lines.push(format!("... (truncated at {} entries)", LIST_LIMIT));
            break;
        }
        let suffix = if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            "/"
        } else {
            ""
        };
        lines.push(format!("{}{}", display_relative(root, entry.path()), suffix));
    }

    if lines.is_empty() {
        format!("{} is empty", display_relative(root, dir))
    } else {
        lines.join("\n")
    }
}
