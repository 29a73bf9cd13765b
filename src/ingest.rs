//! Ingesta de un PDF subido: extracción de texto, troceado, embeddings en
//! modo documento y upsert en el índice vectorial.
//!
//! No hay frontera transaccional: si el upsert falla después de los
//! embeddings (o a mitad de lotes) el índice queda como esté.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    chunker::{self, document_key},
    config::{ChunkIdScheme, EMBEDDING_MODEL},
    error::{RagError, Result},
    llm::Embedder,
    models::{EmbeddingMode, IndexedRecord},
    vector_store::VectorIndex,
};

/// Resumen de una operación de indexación.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexingSummary {
    pub file_name: String,
    pub characters: usize,
    pub chunks_indexed: usize,
    pub record_ids: Vec<String>,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IndexingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}': {} characters, {} chunks indexed.",
            self.file_name, self.characters, self.chunks_indexed
        )
    }
}

/// Comprueba que el fichero subido sea un PDF (por extensión/MIME o por cabecera).
pub fn ensure_pdf(file_name: &str, bytes: &[u8]) -> Result<()> {
    let guessed_pdf = mime_guess::from_path(file_name)
        .iter()
        .any(|m| m.essence_str() == "application/pdf");
    let has_pdf_magic = bytes.starts_with(b"%PDF");

    if !guessed_pdf && !has_pdf_magic {
        return Err(RagError::InvalidUpload(format!("'{file_name}' is not a PDF")));
    }
    if bytes.is_empty() {
        return Err(RagError::InvalidUpload(format!("'{file_name}' is empty")));
    }
    Ok(())
}

/// Extrae el texto de todas las páginas, en orden.
///
/// El extractor corre en un hilo bloqueante; si falla o entra en pánico con un
/// PDF malformado, el error llega como [`RagError::Extraction`].
pub async fn extract_text_from_pdf(bytes: Vec<u8>) -> Result<String> {
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| RagError::Extraction(format!("extractor aborted: {e}")))?;

    extracted.map_err(|e| RagError::Extraction(e.to_string()))
}

/// Orquesta Chunker → Embedder(documento) → upsert en el índice.
#[derive(Clone)]
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    id_scheme: ChunkIdScheme,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, id_scheme: ChunkIdScheme) -> Self {
        Self {
            embedder,
            index,
            id_scheme,
        }
    }

    /// Trocea, embebe en un único lote y hace upsert de un registro por chunk.
    pub async fn index_text(&self, file_name: &str, text: &str) -> Result<IndexingSummary> {
        let mut chunks = chunker::chunk_text(text);
        let characters = text.chars().count();

        if chunks.is_empty() {
            warn!(file_name, "document has no extractable text, nothing to index");
            return Ok(IndexingSummary {
                file_name: file_name.to_string(),
                characters,
                ..Default::default()
            });
        }

        if self.id_scheme == ChunkIdScheme::Document {
            let key = document_key(text);
            for chunk in &mut chunks {
                chunk.id = format!("{key}-{}", chunk.position);
            }
        }

        // 1) Embeddings en bloque
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(EMBEDDING_MODEL, &texts, EmbeddingMode::Document)
            .await?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding {
                provider: "embedder".into(),
                message: format!("got {} embeddings for {} chunks", vectors.len(), chunks.len()),
            });
        }

        // 2) Upsert de (id, vector, {chunk})
        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedRecord::from_chunk(chunk, vector))
            .collect();
        self.index.upsert(&records).await?;

        info!(file_name, chunk_count = records.len(), characters, "document indexed");
        Ok(IndexingSummary {
            file_name: file_name.to_string(),
            characters,
            chunks_indexed: records.len(),
            record_ids: records.into_iter().map(|r| r.id).collect(),
        })
    }
}
