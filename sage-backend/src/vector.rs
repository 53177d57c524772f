//! Contract for the external vector retrieval service, plus an HTTP proxy
//! implementation. Namespace/partition scoping is the retriever's concern:
//! an `HttpVectorRetriever` is constructed per request with its namespace.

use crate::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

/// `query` returns the top-k semantically relevant fragments; `add` ingests
/// a new fragment so past exchanges become retrievable.
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedDocument>, AgentError>;

    async fn add(&self, text: &str) -> Result<(), AgentError>;
}

/// Proxies retrieval calls to an external vector service over HTTP.
pub struct HttpVectorRetriever {
    client: reqwest::Client,
    base_url: String,
    namespace: Option<String>,
}

impl HttpVectorRetriever {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, namespace: Option<String>) -> Self {
        let base_url = base_url.into();
        HttpVectorRetriever {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace,
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<RetrievedDocument>,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[async_trait]
impl VectorRetriever for HttpVectorRetriever {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedDocument>, AgentError> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&QueryRequest {
                query: text,
                k,
                namespace: self.namespace.as_deref(),
            })
            .send()
            .await
            .map_err(|e| AgentError::Persistence(format!("vector service request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Persistence(format!(
                "vector service returned HTTP {}",
                status
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Persistence(format!("invalid vector service response: {}", e)))?;
        Ok(body.documents)
    }

    async fn add(&self, text: &str) -> Result<(), AgentError> {
        let url = format!("{}/documents", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AddRequest {
                text,
                namespace: self.namespace.as_deref(),
            })
            .send()
            .await
            .map_err(|e| AgentError::Persistence(format!("vector service request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Persistence(format!(
                "vector service returned HTTP {}",
                status
            )));
        }
        Ok(())
    }
}
