//! Web search and scrape tool.
//!
//! Searches DuckDuckGo's HTML interface, then fetches every hit concurrently
//! and pulls out the title, meta description and readable paragraphs.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, TaskError};
use crate::tool::{Tool, ToolRegistry};

pub const BROWSER_TOOL: &str = "browserService";

const MIN_PARAGRAPH_CHARS: usize = 50;
const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source: String,
}

/// Configuration for the browser tool
#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub search_url: String,
    pub default_results: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            search_url: "https://html.duckduckgo.com/html/".into(),
            default_results: 5,
            timeout_secs: 60,
            user_agent: "Mozilla/5.0 (compatible; TaskloopBot/1.0)".into(),
        }
    }
}

pub fn browser_toolkit(config: BrowserConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(BrowserTool::new(config)?);
    Ok(registry)
}

pub struct BrowserTool {
    config: BrowserConfig,
    http: reqwest::Client,
}

impl BrowserTool {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TaskError::Config(format!("http client error: {err}")))?;
        Ok(Self { config, http })
    }

    async fn search(&self, query: &str, limit: usize) -> reqwest::Result<Vec<SearchHit>> {
        let url = format!(
            "{}?q={}",
            self.config.search_url,
            urlencoding::encode(query)
        );
        let html = self.fetch(&url).await?;
        let mut hits = parse_search_results(&html);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> reqwest::Result<String> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    async fn scrape(&self, hit: SearchHit) -> Value {
        match self.fetch(&hit.link).await {
            Ok(html) => {
                let page = extract_page(&html, &hit.link);
                json!({
                    "title": hit.title,
                    "pageTitle": page.title,
                    "description": page.description,
                    "content": page.content,
                    "source": page.source,
                })
            }
            Err(err) => {
                tracing::warn!(url = %hit.link, error = %err, "failed to scrape page");
                json!({
                    "title": hit.title,
                    "error": format!("Failed to scrape content for {}: {err}", hit.link),
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserInput {
    name: String,
    #[serde(default)]
    no_of_responses: Option<usize>,
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        BROWSER_TOOL
    }

    fn description(&self) -> &str {
        "Search the web and scrape the top results. Returns the pages as JSON."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Search query"},
                "noOfResponses": {"type": "integer", "description": "How many results to scrape (default 5)"}
            },
            "required": ["name"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let req: BrowserInput = serde_json::from_value(input)
            .map_err(|err| TaskError::InvalidInput(format!("Invalid browserService input: {err}")))?;
        let limit = req
            .no_of_responses
            .unwrap_or(self.config.default_results)
            .max(1);

        tracing::info!(query = %req.name, limit, "searching the web");
        let hits = match self.search(&req.name, limit).await {
            Ok(hits) => hits,
            Err(err) => {
                return Ok(json!({ "error": format!("Failed to scrape content: {err}") }));
            }
        };
        if hits.is_empty() {
            return Ok(json!({ "input": req.name, "output": "No relevant results found." }));
        }

        let pages = join_all(hits.into_iter().map(|hit| self.scrape(hit))).await;
        Ok(json!({ "input": req.name, "output": pages }))
    }
}

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

fn result_anchor() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r#"(?s)<a\b([^>]*\bclass="[^"]*\bresult__a\b[^"]*"[^>]*)>(.*?)</a>"#)
}

fn href_attr() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r#"\bhref="([^"]*)""#)
}

fn title_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r"(?is)<title[^>]*>(.*?)</title>")
}

fn h1_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r"(?is)<h1[^>]*>(.*?)</h1>")
}

fn meta_description() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(
        &CELL,
        r#"(?is)<meta\s+[^>]*name=["']description["'][^>]*content=["']([^"']*)["']"#,
    )
}

fn paragraph() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r"(?is)<p\b[^>]*>(.*?)</p>")
}

fn any_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r"(?s)<[^>]*>")
}

fn html_decode(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn text_of(fragment: &str) -> String {
    let stripped = any_tag().replace_all(fragment, "");
    html_decode(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves DuckDuckGo's `//duckduckgo.com/l/?uddg=<target>&...` redirects.
pub fn unwrap_redirect(link: &str) -> String {
    let link = html_decode(link);
    if let Some((_, rest)) = link.split_once("uddg=") {
        let encoded = rest.split('&').next().unwrap_or_default();
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    if let Some(rest) = link.strip_prefix("//") {
        return format!("https://{rest}");
    }
    link
}

pub fn parse_search_results(html: &str) -> Vec<SearchHit> {
    result_anchor()
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let href = href_attr().captures(attrs)?.get(1)?.as_str();
            let link = unwrap_redirect(href);
            let title = text_of(caps.get(2)?.as_str());
            (link.starts_with("http") && !title.is_empty()).then_some(SearchHit { title, link })
        })
        .collect()
}

pub fn extract_page(html: &str, url: &str) -> PageSummary {
    let first = |re: &Regex| {
        re.captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| text_of(m.as_str()))
            .filter(|text| !text.is_empty())
    };
    let title = first(title_tag())
        .or_else(|| first(h1_tag()))
        .unwrap_or_else(|| "No Title".to_string());
    let description = meta_description()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| html_decode(m.as_str()))
        .unwrap_or_else(|| "No Description".to_string());

    let content: String = paragraph()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| text_of(m.as_str())))
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join("\n\n")
        .chars()
        .take(MAX_CONTENT_CHARS)
        .collect();

    PageSummary {
        title,
        description,
        content: if content.is_empty() {
            "No readable content".to_string()
        } else {
            content
        },
        source: url.to_string(),
    }
}
