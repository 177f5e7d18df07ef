//! web-search tool - Query an HTML search endpoint and list the hits

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tools::implementations::web_fetch::{decode_entities, html_to_text};
use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::registry::ToolHandler;
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

const DEFAULT_NUM_RESULTS: usize = 5;
const MAX_NUM_RESULTS: usize = 20;
const SEARCH_TIMEOUT_SECS: u64 = 20;

static RESULT_LINK: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).ok()
});

pub struct WebSearchTool;

#[derive(Deserialize)]
struct Params {
    query: String,
    #[serde(default)]
    num_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "web-search",
            "Search the web and return result titles and URLs.",
            ToolCategory::Network,
        )
        .required("query", ParameterType::String, "Search query")
        .optional(
            "num_results",
            ParameterType::Integer,
            "Number of results (default 5, max 20)",
        )
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if params
            .get("query")
            .and_then(|v| v.as_str())
            .is_some_and(|q| q.trim().is_empty())
        {
            extra.push("Parameter 'query' must not be empty".to_string());
        }
        if let Some(n) = params.get("num_results").and_then(|v| v.as_i64()) {
            if n < 1 || n as usize > MAX_NUM_RESULTS {
                extra.push(format!(
                    "Parameter 'num_results' must be between 1 and {}",
                    MAX_NUM_RESULTS
                ));
            }
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let limit = params.num_results.unwrap_or(DEFAULT_NUM_RESULTS);

        tracing::info!(query = %params.query, endpoint = %ctx.settings.search_endpoint, "web-search");
        let response = match ctx
            .http
            .get(&ctx.settings.search_endpoint)
            .query(&[("q", params.query.as_str())])
            .header(reqwest::header::USER_AGENT, "taskforge/0.1")
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
        };
        if !response.status().is_success() {
            return ToolResult::error(format!("Search HTTP error: {}", response.status()));
        }
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read search response: {}", e)),
        };

        let hits = parse_results(&body, limit);
        if hits.is_empty() {
            return ToolResult::success(format!("No results for '{}'", params.query));
        }
        let lines: Vec<String> = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("{}. {}\n   {}", i + 1, hit.title, hit.url))
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}

/// Extract result links from a DuckDuckGo-style HTML page
pub fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let Some(re) = (*RESULT_LINK).as_ref() else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|caps| {
            let url = resolve_redirect(&decode_entities(caps.get(1)?.as_str()));
            let title = html_to_text(caps.get(2)?.as_str())
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            (!title.is_empty()).then_some(SearchHit { title, url })
        })
        .take(limit)
        .collect()
}

/// DuckDuckGo wraps targets as `/l/?uddg=<encoded>`
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="result">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fkotlinlang.org%2Fdocs%2Fdata-classes.html&amp;rut=x">Data classes | <b>Kotlin</b></a>
        </div>
        <div class="result">
          <a rel="nofollow" class="result__a" href="https://spring.io/guides">Spring &amp; Guides</a>
        </div>
    "#;

    #[test]
    fn parses_titles_and_unwraps_redirects() {
        let hits = parse_results(PAGE, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Data classes | Kotlin");
        assert_eq!(hits[0].url, "https://kotlinlang.org/docs/data-classes.html");
        assert_eq!(hits[1].title, "Spring & Guides");
        assert_eq!(hits[1].url, "https://spring.io/guides");
    }

    #[test]
    fn respects_limit() {
        assert_eq!(parse_results(PAGE, 1).len(), 1);
        assert!(parse_results("<html></html>", 5).is_empty());
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let ctx = ToolContext::new("/tmp");
        let mut params = Parameters::new();
        params.insert("query".into(), "  ".into());
        let result = WebSearchTool.execute(&params, &ctx).await;
        assert_eq!(result.error_code.as_deref(), Some("invalid_parameters"));
    }
}
