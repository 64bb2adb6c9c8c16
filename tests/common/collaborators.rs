//! Scripted collaborator doubles: deterministic stand-ins for the model,
//! web search, and retriever.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use dialogweave::collaborators::{
    ChatModel, CollaboratorError, ModelRequest, ModelResponse, RetrievedChunk, Retriever,
    SearchResult, StructuredSchema, WebSearch,
};

/// Pops scripted responses in FIFO order; chat replies and structured
/// outputs are scripted independently. Streams chat content word by word
/// when a delta sender is supplied.
#[derive(Default)]
pub struct ScriptedModel {
    generations: Mutex<VecDeque<ModelResponse>>,
    structured: Mutex<VecDeque<Value>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: ModelResponse) {
        self.generations
            .lock()
            .expect("generations poisoned")
            .push_back(response);
    }

    pub fn push_structured(&self, value: Value) {
        self.structured
            .lock()
            .expect("structured poisoned")
            .push_back(value);
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(
        &self,
        _request: ModelRequest,
        deltas: Option<flume::Sender<String>>,
    ) -> Result<ModelResponse, CollaboratorError> {
        let response = self
            .generations
            .lock()
            .expect("generations poisoned")
            .pop_front()
            .ok_or_else(|| CollaboratorError::provider("scripted", "no scripted response left"))?;
        if let Some(tx) = deltas {
            for word in response.content.split_inclusive(' ') {
                let _ = tx.send(word.to_string());
            }
        }
        Ok(response)
    }

    async fn generate_structured(
        &self,
        _request: ModelRequest,
        schema: StructuredSchema,
    ) -> Result<Value, CollaboratorError> {
        self.structured
            .lock()
            .expect("structured poisoned")
            .pop_front()
            .ok_or_else(|| {
                CollaboratorError::structured_output(schema.name, "no scripted value left")
            })
    }
}

/// Returns one synthetic hit per query.
#[derive(Default)]
pub struct StubSearch;

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        Ok(vec![SearchResult {
            url: format!("https://example.com/{}", query.replace(' ', "-")),
            title: query.to_string(),
            content: format!("Stub result for '{query}'"),
            score: 0.9,
        }])
    }
}

/// Always-failing search, for degradation tests.
#[derive(Default)]
pub struct FailingSearch;

#[async_trait]
impl WebSearch for FailingSearch {
    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        Err(CollaboratorError::provider("stub-search", "network down"))
    }
}

/// Fixed document chunks regardless of query.
pub struct StaticRetriever {
    pub chunks: Vec<RetrievedChunk>,
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError> {
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }
}
