//! Índice vectorial: upsert de `(id, vector, metadatos)` y consultas top-k.
//!
//! API pública:
//!   - trait `VectorIndex`
//!   - `PineconeIndex::connect(&AppConfig)` (resuelve el host del índice al arrancar)
//!   - `MemoryIndex` (similitud coseno en memoria, para ejecuciones locales y tests)

use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;

use crate::config::{AppConfig, INDEX_NAME};
use crate::error::{RagError, Result};
use crate::models::{IndexedRecord, QueryMatch};

const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
const PINECONE_API_VERSION: &str = "2024-07";

/// Pinecone recomienda no superar ~2 MB por petición de upsert.
const PINECONE_UPSERT_BATCH: usize = 100;

/// Índice vectorial compartido por todo el proceso (un único espacio de nombres).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserta o sobrescribe registros por id.
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()>;

    /// Devuelve las `top_k` coincidencias más cercanas, en el orden del índice.
    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>>;
}

// --- Pinecone ---

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    upsert_url: Url,
    query_url: Url,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexedRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

impl PineconeIndex {
    /// Crea el cliente para el host de datos de un índice (con o sin esquema).
    pub fn new(api_key: impl Into<String>, host: &str) -> anyhow::Result<Self> {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let base = Url::parse(&base).with_context(|| format!("Invalid Pinecone host: {host}"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            upsert_url: base.join("vectors/upsert")?,
            query_url: base.join("query")?,
        })
    }

    /// Conecta con el índice configurado, preguntando su host al plano de control
    /// si no viene fijado en `PINECONE_INDEX_HOST`.
    pub async fn connect(cfg: &AppConfig) -> anyhow::Result<Self> {
        let api_key = cfg
            .pinecone_api_key
            .clone()
            .ok_or_else(|| anyhow!("Missing PINECONE_API_KEY in the environment"))?;

        let host = match &cfg.pinecone_index_host {
            Some(host) => host.clone(),
            None => describe_index_host(&api_key, INDEX_NAME).await?,
        };

        info!(index = INDEX_NAME, %host, "Pinecone index ready");
        Self::new(api_key, &host)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url.clone())
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(backend = "Pinecone", error = %e, "request failed");
                index_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(backend = "Pinecone", %status, "API error");
            return Err(index_error(format!("API returned {status}: {detail}")));
        }
        Ok(response)
    }
}

/// Consulta el host de datos de un índice en el plano de control de Pinecone.
pub async fn describe_index_host(api_key: &str, index_name: &str) -> anyhow::Result<String> {
    let url = format!("{PINECONE_CONTROL_URL}/indexes/{index_name}");
    let response = reqwest::Client::new()
        .get(&url)
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
        .send()
        .await
        .with_context(|| format!("Could not reach Pinecone to describe index '{index_name}'"))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(anyhow!("Pinecone returned {status} describing index '{index_name}': {detail}"));
    }

    let described: DescribeIndexResponse = response.json().await?;
    Ok(described.host)
}

fn index_error(message: String) -> RagError {
    RagError::VectorIndex {
        backend: "Pinecone".into(),
        message,
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        for batch in records.chunks(PINECONE_UPSERT_BATCH) {
            self.post(&self.upsert_url, &UpsertRequest { vectors: batch }).await?;
        }
        debug!(backend = "Pinecone", record_count = records.len(), "upserted records");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };
        let response = self.post(&self.query_url, &body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| index_error(format!("failed to parse query response: {e}")))?;

        debug!(backend = "Pinecone", matches = ?parsed.matches, "query results");
        Ok(parsed.matches)
    }
}

// --- En memoria ---

/// Índice en memoria con similitud coseno. Misma semántica de upsert que Pinecone.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, IndexedRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryIndex {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<IndexedRecord> {
        self.records.read().await.get(id).cloned()
    }
}

/// Devuelve 0.0 si alguno de los vectores tiene norma cero.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[IndexedRecord]) -> Result<()> {
        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>> {
        let store = self.records.read().await;
        let mut scored: Vec<QueryMatch> = store
            .values()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(&record.vector, vector),
                metadata: include_metadata.then(|| record.metadata.clone()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
