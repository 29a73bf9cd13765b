//! Capacidades externas de IA: embeddings y generación de respuestas.
//!
//! Ambas se definen como traits para inyectarlas en el indexador, el
//! recuperador y el orquestador; en producción se implementan sobre Cohere.

use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use rig::providers::cohere;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::models::{Embedding, EmbeddingMode};

const COHERE_EMBED_URL: &str = "https://api.cohere.com/v1/embed";

/// Máximo de textos que acepta Cohere en una sola petición de embeddings.
const COHERE_MAX_BATCH: usize = 96;

/// Capacidad de embeddings: lista de textos → un vector por texto, en orden.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, model: &str, texts: &[String], mode: EmbeddingMode) -> Result<Vec<Embedding>>;
}

/// Capacidad de generación: prompt + modelo → texto libre.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------
// EMBEDDINGS
// ---------------------------------------------------------------------

/// Embeddings de Cohere vía `/v1/embed`, truncando el exceso por el final.
pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
}

impl CohereEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    async fn embed_batch(&self, model: &str, texts: &[String], mode: EmbeddingMode) -> Result<Vec<Embedding>> {
        let body = EmbedRequest {
            texts,
            model,
            input_type: mode,
            truncate: "END",
        };

        let response = self
            .client
            .post(COHERE_EMBED_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Cohere", error = %e, "embed request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<CohereErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            error!(provider = "Cohere", %status, "embed API error");
            return Err(embedding_error(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("failed to parse response: {e}")))?;
        Ok(parsed.embeddings)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: EmbeddingMode,
    truncate: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

#[derive(Deserialize)]
struct CohereErrorResponse {
    message: String,
}

fn embedding_error(message: String) -> RagError {
    RagError::Embedding {
        provider: "Cohere".into(),
        message,
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed(&self, model: &str, texts: &[String], mode: EmbeddingMode) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "Cohere", model, mode = mode.as_str(), batch_size = texts.len(), "embedding texts");

        // Cohere limita el tamaño de lote; se parte sin cambiar el orden.
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(COHERE_MAX_BATCH) {
            let embedded = self.embed_batch(model, batch, mode).await?;
            if embedded.len() != batch.len() {
                return Err(embedding_error(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------
// CHAT / COMPLETION
// ---------------------------------------------------------------------

/// Generación de respuestas con el chat de Cohere a través de Rig.
pub struct CohereGenerator {
    client: cohere::Client,
}

impl CohereGenerator {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: cohere::Client::new(api_key),
        }
    }
}

#[async_trait]
impl AnswerGenerator for CohereGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        // Todo va en un único mensaje: instrucciones, pregunta y contexto.
        let agent = self.client.agent(model).build();

        agent.prompt(prompt).await.map_err(|e| {
            error!(provider = "Cohere", model, error = %e, "chat request failed");
            RagError::Generation {
                provider: "Cohere".into(),
                message: e.to_string(),
            }
        })
    }
}
