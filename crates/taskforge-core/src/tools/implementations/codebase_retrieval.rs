//! codebase-retrieval tool - Keyword search over the working tree
//!
//! Files are scored by how many distinct query terms they contain, weighted
//! toward matches in the file path. `.gitignore` rules are honored.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::path_utils::display_relative;
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

const MAX_RESULTS: usize = 10;
const MAX_FILE_BYTES: u64 = 512 * 1024;
const SNIPPET_LINES: usize = 3;
const PATH_MATCH_WEIGHT: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "for", "is", "are", "where", "what", "how",
    "which", "with", "that", "this", "does", "do", "find", "show", "me", "all", "code",
];

pub struct CodebaseRetrievalTool;

#[derive(Deserialize)]
struct Params {
    information_request: String,
}

#[derive(Debug)]
struct Hit {
    path: PathBuf,
    score: usize,
    snippet: Vec<(usize, String)>,
}

#[async_trait]
impl ToolHandler for CodebaseRetrievalTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "codebase-retrieval",
            "Find the files most relevant to a natural-language request, with matching lines.",
            ToolCategory::Repository,
        )
        .required(
            "information_request",
            ParameterType::String,
            "What to look for, e.g. 'user repository save method'",
        )
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if let Some(request) = params.get("information_request").and_then(|v| v.as_str()) {
            if query_terms(request).is_empty() {
                extra.push("Parameter 'information_request' has no searchable terms".to_string());
            }
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let terms = query_terms(&params.information_request);
        let root = ctx.working_dir().to_path_buf();

        let hits = match tokio::task::spawn_blocking({
            let root = root.clone();
            move || search(&root, &terms)
        })
        .await
        {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("Search failed: {}", e)),
        };

        if hits.is_empty() {
            return ToolResult::success(format!(
                "No files matched '{}'",
                params.information_request
            ));
        }

        let mut out = String::new();
        for hit in &hits {
            out.push_str(&format!(
                "{} (score {})\n",
                display_relative(&root, &hit.path),
                hit.score
            ));
            for (line_no, line) in &hit.snippet {
                out.push_str(&format!("  {:>5}: {}\n", line_no, line.trim()));
            }
        }
        ToolResult::success(out.trim_end().to_string())
    }
}

fn query_terms(request: &str) -> Vec<String> {
    let mut terms: Vec<String> = request
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn search(root: &Path, terms: &[String]) -> Vec<Hit> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build();

    let mut hits: Vec<Hit> = walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            entry
                .metadata()
                .map(|m| m.len() <= MAX_FILE_BYTES)
                .unwrap_or(false)
        })
        .filter_map(|entry| score_file(root, entry.path(), terms))
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    hits.truncate(MAX_RESULTS);
    hits
}

fn score_file(root: &Path, path: &Path, terms: &[String]) -> Option<Hit> {
    // Binary and non-UTF-8 files are skipped
    let content = std::fs::read_to_string(path).ok()?;
    let lower = content.to_lowercase();
    let rel = display_relative(root, path).to_lowercase();

    let mut score = 0;
    for term in terms {
        if rel.contains(term.as_str()) {
            score += PATH_MATCH_WEIGHT;
        }
        if lower.contains(term.as_str()) {
            score += 1;
        }
    }
    if score == 0 {
        return None;
    }

    let snippet = content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let l = line.to_lowercase();
            terms.iter().any(|t| l.contains(t.as_str()))
        })
        .take(SNIPPET_LINES)
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect();

    Some(Hit {
        path: path.to_path_buf(),
        score,
        snippet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    #[test]
    fn terms_drop_stopwords_and_duplicates() {
        assert_eq!(
            query_terms("Where is the User repository? user save"),
            vec!["repository", "save", "user"]
        );
    }

    #[tokio::test]
    async fn ranks_path_matches_first_and_shows_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/UserRepository.kt"),
            "interface UserRepository {\n  fun save(user: User)\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("src/Other.kt"), "// mentions user once\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "nothing relevant\n").unwrap();

        let ctx = ToolContext::new(dir.path());
        let call = ToolCall::new("codebase-retrieval")
            .with_param("information_request", "user repository save");
        let result = CodebaseRetrievalTool.execute(call.parameters(), &ctx).await;

        assert!(result.success);
        let first_line = result.output.lines().next().unwrap();
        assert!(first_line.starts_with("src/UserRepository.kt"));
        assert!(result.output.contains("fun save(user: User)"));
        assert!(result.output.contains("src/Other.kt"));
        assert!(!result.output.contains("README.md"));
    }

    #[tokio::test]
    async fn stopword_only_request_is_invalid() {
        let ctx = ToolContext::new("/tmp");
        let call = ToolCall::new("codebase-retrieval").with_param("information_request", "where is the");
        let result = CodebaseRetrievalTool.execute(call.parameters(), &ctx).await;
        assert_eq!(result.error_code.as_deref(), Some("invalid_parameters"));
    }
}
