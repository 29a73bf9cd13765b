// Módulos de la aplicación
mod api;
mod app_state;
mod chunker;
mod config;
mod error;
mod ingest;
mod llm;
mod models;
mod rag;
mod session;
mod vector_store;

#[cfg(test)]
mod testing;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app_state::{spawn_idle_sweeper, AppState, SessionRegistry};
use crate::config::VectorBackend;
use crate::ingest::Indexer;
use crate::llm::{AnswerGenerator, CohereEmbedder, CohereGenerator, Embedder};
use crate::rag::Retriever;
use crate::session::SessionOrchestrator;
use crate::vector_store::{MemoryIndex, PineconeIndex, VectorIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error loading configuration")?;

    // 3. Clientes externos, creados una vez y pasados a los componentes
    let embedder: Arc<dyn Embedder> = Arc::new(CohereEmbedder::new(cfg.cohere_api_key.clone()));
    let generator: Arc<dyn AnswerGenerator> = Arc::new(CohereGenerator::new(&cfg.cohere_api_key));
    let index: Arc<dyn VectorIndex> = match cfg.vector_backend {
        VectorBackend::Pinecone => Arc::new(
            PineconeIndex::connect(&cfg)
                .await
                .context("Error connecting to the Pinecone index")?,
        ),
        VectorBackend::Memory => {
            info!("Using the in-memory vector index; indexed documents are lost on exit.");
            Arc::new(MemoryIndex::new())
        }
    };

    // 4. Indexador, recuperador y orquestador de sesiones
    let orchestrator = SessionOrchestrator::new(
        Indexer::new(embedder.clone(), index.clone(), cfg.chunk_id_scheme),
        Retriever::new(embedder, index),
        generator,
        cfg.citation_delay,
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        orchestrator: Arc::new(orchestrator),
        sessions: Arc::new(SessionRegistry::new(cfg.history_limit)),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // Las sesiones abandonadas se descartan tras el tiempo de inactividad.
    spawn_idle_sweeper(app_state.sessions.clone(), cfg.session_idle_timeout);

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("Could not bind {server_addr}"))?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Server listening on {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if app_state.config.open_browser && webbrowser::open(&server_url).is_err() {
        info!("Could not open a browser. Please visit {} manually.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Shutdown signal received, closing the server.");
        })
        .await?;

    info!("✅ Server closed cleanly.");
    Ok(())
}
