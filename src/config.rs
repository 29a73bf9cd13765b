//! Carga y gestión de configuración de la aplicación (Cohere + Pinecone).
//!
//! Las credenciales y opciones de despliegue llegan por entorno (o `.env`).
//! Los nombres de modelo, el índice, el tamaño de chunk y el top-k son
//! constantes fijas y no se exponen como configuración.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Nombre del índice de Pinecone.
pub const INDEX_NAME: &str = "quickstart";
/// Modelo de embeddings de Cohere (modos documento y consulta).
pub const EMBEDDING_MODEL: &str = "embed-english-v3.0";
/// Modelo de chat de Cohere usado para generar la respuesta.
pub const CHAT_MODEL: &str = "command-r-plus";
/// Tamaño de cada chunk, en caracteres.
pub const CHUNK_SIZE: usize = 1000;
/// Número de chunks recuperados por consulta.
pub const TOP_K: usize = 5;

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_CITATION_DELAY_MS: u64 = 3000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    Pinecone,
    Memory,
}

impl VectorBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("Unsupported vector backend: {other}")),
        }
    }
}

/// Cómo se construyen los identificadores de los registros indexados.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkIdScheme {
    /// `"0".."n-1"`: un documento nuevo sobrescribe los ordinales del anterior.
    Ordinal,
    /// `"{hash}-{i}"`: cada documento tiene su propio espacio de ids.
    Document,
}

impl ChunkIdScheme {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ordinal" => Ok(Self::Ordinal),
            "document" => Ok(Self::Document),
            other => Err(anyhow!("Unsupported chunk id scheme: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub cohere_api_key: String,

    pub vector_backend: VectorBackend,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index_host: Option<String>,

    pub server_addr: String,
    pub open_browser: bool,

    pub chunk_id_scheme: ChunkIdScheme,
    pub history_limit: Option<usize>,
    pub citation_delay: Duration,
    /// Tiempo sin peticiones tras el cual una sesión se descarta.
    pub session_idle_timeout: Duration,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cohere_api_key =
            var("COHERE_API_KEY").ok_or_else(|| anyhow!("Missing COHERE_API_KEY in the environment"))?;

        let vector_backend =
            VectorBackend::from_str(&var("VECTOR_BACKEND").unwrap_or_else(|| "pinecone".to_string()))?;
        let pinecone_api_key = var("PINECONE_API_KEY");
        if vector_backend == VectorBackend::Pinecone && pinecone_api_key.is_none() {
            return Err(anyhow!("Missing PINECONE_API_KEY in the environment"));
        }
        let pinecone_index_host = var("PINECONE_INDEX_HOST");

        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        let open_browser = match var("OPEN_BROWSER") {
            Some(v) => parse_bool(&v).with_context(|| format!("Invalid OPEN_BROWSER: {v}"))?,
            None => true,
        };

        let chunk_id_scheme =
            ChunkIdScheme::from_str(&var("CHUNK_ID_SCHEME").unwrap_or_else(|| "ordinal".to_string()))?;

        let history_limit = var("HISTORY_LIMIT")
            .map(|v| v.parse::<usize>().with_context(|| format!("Invalid HISTORY_LIMIT: {v}")))
            .transpose()?;
        if history_limit == Some(0) {
            return Err(anyhow!("HISTORY_LIMIT must be greater than zero"));
        }

        let citation_delay_ms = var("CITATION_DELAY_MS")
            .map(|v| v.parse::<u64>().with_context(|| format!("Invalid CITATION_DELAY_MS: {v}")))
            .transpose()?
            .unwrap_or(DEFAULT_CITATION_DELAY_MS);

        let session_idle_secs = var("SESSION_IDLE_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().with_context(|| format!("Invalid SESSION_IDLE_TIMEOUT_SECS: {v}")))
            .transpose()?
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);
        if session_idle_secs == 0 {
            return Err(anyhow!("SESSION_IDLE_TIMEOUT_SECS must be greater than zero"));
        }

        Ok(Self {
            cohere_api_key,
            vector_backend,
            pinecone_api_key,
            pinecone_index_host,
            server_addr,
            open_browser,
            chunk_id_scheme,
            history_limit,
            citation_delay: Duration::from_millis(citation_delay_ms),
            session_idle_timeout: Duration::from_secs(session_idle_secs),
        })
    }
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("not a boolean: {other}")),
    }
}
