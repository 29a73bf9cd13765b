//! Orquestación por sesión: subida → indexación; pregunta → recuperación →
//! generación, con historial de conversación y estado de progreso.
//!
//! Cada acción se ejecuta completa con el mutex de la sesión tomado, así que
//! dos acciones de la misma sesión nunca se solapan. Los errores no deshacen
//! lo ya hecho (chunks ya subidos, turno de usuario ya añadido).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    app_state::SessionHandle,
    error::{RagError, Result},
    ingest::{self, Indexer, IndexingSummary},
    llm::AnswerGenerator,
    models::{ChatTurn, Role},
    rag::{self, Retriever},
};

const MSG_INDEXED: &str = "Document processed and indexed successfully!";
const MSG_SEARCHING: &str = "Searching...";
const MSG_EXTRACTING: &str = "Extracting info...";
const MSG_CITATIONS: &str = "Found the Citations!";

/// Historial de conversación. Sin límite, crece sin desalojo; con límite,
/// se descartan primero los turnos más antiguos.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: VecDeque<ChatTurn>,
    limit: Option<usize>,
}

impl ConversationHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            turns: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        if let Some(limit) = self.limit {
            while self.turns.len() > limit {
                self.turns.pop_front();
            }
        }
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

/// Estado de chat de una sesión activa.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub history: ConversationHistory,
}

impl ChatSession {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            history: ConversationHistory::new(history_limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub context: String,
    pub citations: Vec<String>,
    /// `false` cuando el índice no devolvió ningún chunk utilizable.
    pub context_found: bool,
}

pub struct SessionOrchestrator {
    indexer: Indexer,
    retriever: Retriever,
    generator: Arc<dyn AnswerGenerator>,
    citation_delay: Duration,
}

impl SessionOrchestrator {
    pub fn new(
        indexer: Indexer,
        retriever: Retriever,
        generator: Arc<dyn AnswerGenerator>,
        citation_delay: Duration,
    ) -> Self {
        Self {
            indexer,
            retriever,
            generator,
            citation_delay,
        }
    }

    /// Evento de subida: valida, extrae el texto del PDF e indexa.
    pub async fn handle_upload(
        &self,
        handle: &SessionHandle,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<IndexingSummary> {
        let _chat = handle.chat.lock().await;
        handle.update_status(|s| {
            s.running(&format!("Reading '{file_name}'..."), 0.1);
            s.citations.clear();
        });

        let text = match ingest::ensure_pdf(file_name, &bytes) {
            Ok(()) => ingest::extract_text_from_pdf(bytes).await,
            Err(e) => Err(e),
        };
        let text = text.map_err(|e| fail(handle, e))?;

        handle.update_status(|s| s.running(&format!("Indexing '{file_name}'..."), 0.5));
        let summary = self
            .indexer
            .index_text(file_name, &text)
            .await
            .map_err(|e| fail(handle, e))?;

        info!(session_id = %handle.id, %summary, "upload processed");
        handle.update_status(|s| {
            s.complete(MSG_INDEXED);
            s.document = Some(file_name.to_string());
        });
        Ok(summary)
    }

    /// Evento de consulta: añade el turno del usuario, recupera, genera y
    /// añade el turno del asistente.
    pub async fn handle_query(&self, handle: &SessionHandle, query: &str) -> Result<ChatResponse> {
        let mut chat = handle.chat.lock().await;
        chat.history.push(ChatTurn::new(Role::User, query));

        // 1) Recuperación, mostrando los chunks en cuanto llegan
        handle.update_status(|s| {
            s.running(MSG_SEARCHING, 0.2);
            s.citations.clear();
        });
        let retrieval = self.retriever.retrieve(query).await.map_err(|e| fail(handle, e))?;
        handle.update_status(|s| {
            s.citations = retrieval.chunks.clone();
            s.progress = 0.4;
        });

        // 2) Generación
        let answer = rag::generate_answer(self.generator.as_ref(), query, &retrieval.context)
            .await
            .map_err(|e| fail(handle, e))?;

        // 3) Pausa puramente estética entre estados
        handle.update_status(|s| s.running(MSG_EXTRACTING, 0.7));
        tokio::time::sleep(self.citation_delay).await;
        handle.update_status(|s| s.complete(MSG_CITATIONS));

        chat.history.push(ChatTurn::new(Role::Assistant, answer.text.clone()));
        info!(
            session_id = %handle.id,
            citations = retrieval.chunks.len(),
            history_len = chat.history.len(),
            "query answered"
        );

        Ok(ChatResponse {
            answer: answer.text,
            context: answer.context,
            context_found: !retrieval.chunks.is_empty(),
            citations: retrieval.chunks,
        })
    }

    pub async fn history(&self, handle: &SessionHandle) -> Vec<ChatTurn> {
        handle.chat.lock().await.history.turns()
    }
}

fn fail(handle: &SessionHandle, err: RagError) -> RagError {
    warn!(session_id = %handle.id, kind = ?err.kind(), error = %err, "session action failed");
    handle.update_status(|s| s.failed(err.user_message()));
    err
}
