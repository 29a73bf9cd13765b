//! Tipos de error del pipeline RAG.
//!
//! Cada fallo de un servicio externo se devuelve como un valor tipado hasta el
//! orquestador de sesión, que decide qué mensaje mostrar al usuario y qué
//! código HTTP devolver.

use serde::Serialize;
use thiserror::Error;

/// Errores que pueden producirse al subir, indexar o consultar un documento.
#[derive(Debug, Error)]
pub enum RagError {
    /// El fichero subido no es un PDF o la petición no trae fichero.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// No se pudo extraer texto del PDF (cifrado, corrupto, sin capa de texto...).
    #[error("PDF extraction error: {0}")]
    Extraction(String),

    /// Fallo en la llamada de embeddings.
    #[error("Embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// Fallo en el índice vectorial (upsert o query).
    #[error("Vector index error ({backend}): {message}")]
    VectorIndex { backend: String, message: String },

    /// Fallo en la generación de la respuesta.
    #[error("Generation error ({provider}): {message}")]
    Generation { provider: String, message: String },

    /// La sesión indicada no existe (o ya terminó).
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Categoría del error, expuesta al frontend junto al mensaje.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUpload,
    Extraction,
    Embedding,
    VectorIndex,
    Generation,
    UnknownSession,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUpload(_) => ErrorKind::InvalidUpload,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::VectorIndex { .. } => ErrorKind::VectorIndex,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::UnknownSession(_) => ErrorKind::UnknownSession,
        }
    }

    /// Mensaje para el usuario final. Los servicios externos caídos no se
    /// confunden con "no hay contexto relevante".
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidUpload(msg) => format!("Please upload a PDF file ({msg})."),
            Self::Extraction(_) => {
                "Could not read text from this PDF. Is it encrypted, corrupt or a scanned image?"
                    .to_string()
            }
            Self::Embedding { .. } => {
                "The embedding service is unavailable right now. Please try again.".to_string()
            }
            Self::VectorIndex { .. } => {
                "The document index is unavailable right now. Please try again.".to_string()
            }
            Self::Generation { .. } => {
                "The answer could not be generated right now. Please try again.".to_string()
            }
            Self::UnknownSession(_) => {
                "This chat session has ended. Please start a new one.".to_string()
            }
        }
    }
}

/// Alias de resultado para las operaciones del pipeline.
pub type Result<T> = std::result::Result<T, RagError>;
