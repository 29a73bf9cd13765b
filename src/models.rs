//! Modelos de dominio (chunks, registros del índice vectorial y turnos de chat).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Vector de embedding de dimensión fija.
pub type Embedding = Vec<f32>;

/// Clave de metadatos donde se guarda el texto original del chunk.
pub const CHUNK_METADATA_KEY: &str = "chunk";

/// Trozo de texto del documento, unidad de embedding y de recuperación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    /// Ordinal dentro del documento (0-indexado).
    pub position: usize,
    pub text: String,
}

/// Modo del embedding: los modelos duales codifican distinto documentos y consultas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmbeddingMode {
    #[serde(rename = "search_document")]
    Document,
    #[serde(rename = "search_query")]
    Query,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "search_document",
            Self::Query => "search_query",
        }
    }
}

/// Registro persistido en el índice vectorial: (id, vector, metadatos).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedRecord {
    pub id: String,
    #[serde(rename = "values")]
    pub vector: Embedding,
    pub metadata: Map<String, Value>,
}

impl IndexedRecord {
    /// Registro de un chunk con metadatos `{"chunk": texto}`.
    pub fn from_chunk(chunk: &Chunk, vector: Embedding) -> Self {
        let mut metadata = Map::new();
        metadata.insert(CHUNK_METADATA_KEY.to_string(), Value::String(chunk.text.clone()));
        Self {
            id: chunk.id.clone(),
            vector,
            metadata,
        }
    }
}

/// Coincidencia devuelta por una consulta al índice vectorial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl QueryMatch {
    /// Texto del chunk, si los metadatos existen y traen `chunk` como string.
    pub fn chunk_text(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(CHUNK_METADATA_KEY)?
            .as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Turno de la conversación.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
