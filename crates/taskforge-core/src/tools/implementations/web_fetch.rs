//! web-fetch tool - Fetch a URL and return its text content

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::tools::metadata::{ParameterType, ToolCategory, ToolMetadata, ValidationResult};
use crate::tools::registry::ToolHandler;
use crate::tools::truncation::{truncate_output, Keep};
use crate::tools::{parse_params, Parameters, ToolContext, ToolResult};

const FETCH_TIMEOUT_SECS: u64 = 30;
const MAX_DOWNLOAD_BYTES: usize = 5 * 1024 * 1024;

static SCRIPT_STYLE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").ok());
static TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").ok());
static BLANK_LINES: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\n\s*\n(\s*\n)+").ok());

pub struct WebFetchTool;

#[derive(Deserialize)]
struct Params {
    url: String,
}

#[async_trait]
impl ToolHandler for WebFetchTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            "web-fetch",
            "Fetch a web page over HTTP(S) and return its text with markup removed.",
            ToolCategory::Network,
        )
        .required("url", ParameterType::String, "http:// or https:// URL")
    }

    fn validate_parameters(&self, params: &Parameters) -> ValidationResult {
        let mut extra = Vec::new();
        if let Some(url) = params.get("url").and_then(|v| v.as_str()) {
            if let Err(e) = validate_url(url) {
                extra.push(format!("Parameter 'url' is invalid: {}", e));
            }
        }
        self.metadata().validate(params).with_errors(extra)
    }

    async fn perform(&self, params: &Parameters, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match validate_url(&params.url) {
            Ok(u) => u,
            Err(e) => return ToolResult::error(e),
        };

        tracing::info!(url = %url, "web-fetch");
        let response = match ctx
            .http
            .get(url)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ToolResult::error(format!("Request timed out: {}", e))
            }
            Err(e) => return ToolResult::error(format!("Failed to fetch URL: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolResult::error(format!("HTTP error: {}", status));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read response body: {}", e)),
        };
        if bytes.len() > MAX_DOWNLOAD_BYTES {
            return ToolResult::error(format!("Response too large: {} bytes", bytes.len()));
        }

        let body = String::from_utf8_lossy(&bytes);
        let text = if is_html {
            html_to_text(&body)
        } else {
            body.into_owned()
        };
        ToolResult::success(truncate_output(&text, Keep::Head))
    }
}

/// Parse the URL and refuse local or private hosts
fn validate_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Unsupported scheme '{}'", url.scheme()));
    }
    let host = url.host_str().ok_or("URL has no host")?;
    if is_private_host(host) {
        return Err(format!("Blocked private or local address '{}'", host));
    }
    Ok(url)
}

fn is_private_host(host: &str) -> bool {
    let lower = host.trim_matches(|c| c == '[' || c == ']').to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".local") || lower.ends_with(".internal") {
        return true;
    }
    match lower.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback()
                || ip.is_private()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
        }
        Ok(IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

/// Drop scripts, styles, and tags; decode the common entities
pub(crate) fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for pattern in [&SCRIPT_STYLE, &TAG] {
        if let Some(re) = (**pattern).as_ref() {
            text = re.replace_all(&text, " ").into_owned();
        }
    }
    let text = decode_entities(&text);
    let trimmed: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = trimmed.join("\n");
    match (*BLANK_LINES).as_ref() {
        Some(re) => re.replace_all(&joined, "\n\n").trim().to_string(),
        None => joined.trim().to_string(),
    }
}

pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_scripts() {
        let html = "<html><head><style>p{}</style><script>alert(1)</script></head>\
                    <body><h1>Title</h1>\n\n\n\n<p>Fish &amp; chips</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Fish & chips"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com/page").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("http://localhost:8080").is_err());
        assert!(validate_url("http://192.168.1.5/").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[tokio::test]
    async fn invalid_url_fails_validation_without_request() {
        let ctx = ToolContext::new("/tmp");
        let mut params = Parameters::new();
        params.insert("url".into(), "http://127.0.0.1/".into());

        let result = WebFetchTool.execute(&params, &ctx).await;
        assert_eq!(result.error_code.as_deref(), Some("invalid_parameters"));
    }
}
