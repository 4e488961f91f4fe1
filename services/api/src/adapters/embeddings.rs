//! services/api/src/adapters/embeddings.rs
//!
//! This module contains the adapter for OpenAI's embeddings endpoint.
//! It implements the `SemanticSimilarity` port from the `core` crate, which the
//! augmentation stage uses to break ties between nearby date or hours candidates.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use syllabus_core::error::TransportCategory;
use syllabus_core::ports::{PortError, PortResult, SemanticSimilarity};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SemanticSimilarity` port using OpenAI embeddings.
#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    /// Creates a new `OpenAiEmbeddingAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Sorts an OpenAI failure into the port error variant the pipeline can classify.
fn to_port_error(e: OpenAIError) -> PortError {
    let detail = e.to_string();
    match TransportCategory::classify(&detail) {
        TransportCategory::Authentication => PortError::Unauthorized,
        TransportCategory::Quota => PortError::QuotaExceeded(detail),
        TransportCategory::Network => PortError::Unavailable(detail),
        TransportCategory::Unknown => PortError::Unexpected(detail),
    }
}

//=========================================================================================
// `SemanticSimilarity` Trait Implementation
//=========================================================================================

#[async_trait]
impl SemanticSimilarity for OpenAiEmbeddingAdapter {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(to_port_error)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(to_port_error)?;

        response
            .data
            .into_iter()
            .next()
            .map(|embedding| embedding.embedding)
            .ok_or_else(|| PortError::Unexpected("Embedding response contained no vectors".to_string()))
    }
}
