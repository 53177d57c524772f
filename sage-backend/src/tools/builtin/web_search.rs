//! Web search tool backed by the DuckDuckGo instant-answer API.

use crate::tools::types::{PropertySchema, ToolDefinition, ToolInputSchema, ToolResult};
use crate::tools::Tool;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
const MAX_RESULTS: usize = 5;
const REGION: &str = "us-en";

pub struct WebSearchTool {
    client: reqwest::Client,
    definition: ToolDefinition,
}

impl WebSearchTool {
    pub fn new(client: reqwest::Client) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "query".to_string(),
            PropertySchema::string(
                "The search query. Be specific; include names, dates, and places.",
            ),
        );

        WebSearchTool {
            client,
            definition: ToolDefinition {
                name: "web_search".to_string(),
                description: "Search the web for accurate, up-to-date information. Returns a list of result snippets with their source URLs.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["query".to_string()],
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

#[derive(Debug, Deserialize)]
struct DdgResponse {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<DdgTopic>,
}

#[derive(Debug, Deserialize)]
struct DdgTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let params: SearchParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let request = self.client.get(SEARCH_ENDPOINT).query(&[
            ("q", params.query.as_str()),
            ("format", "json"),
            ("no_html", "1"),
            ("kl", REGION),
        ]);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolResult::error(format!("Search service returned HTTP {}", status));
        }

        let body: DdgResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to parse search response: {}", e)),
        };

        let mut lines = Vec::new();
        if !body.abstract_text.is_empty() {
            lines.push(format!("- {} ({})", body.abstract_text, body.abstract_url));
        }
        for topic in body
            .related_topics
            .iter()
            .filter(|t| !t.text.is_empty())
            .take(MAX_RESULTS.saturating_sub(lines.len()))
        {
            lines.push(format!("- {} ({})", topic.text, topic.first_url));
        }

        if lines.is_empty() {
            return ToolResult::success(format!("No results found for '{}'.", params.query));
        }

        let artifact = serde_json::json!({
            "query": params.query,
            "results": lines,
        });
        ToolResult::success(lines.join("\n")).with_artifact(artifact)
    }
}
