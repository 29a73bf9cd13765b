use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{RagError, Result};
use crate::session::{ChatSession, SessionOrchestrator};

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub sessions: Arc<SessionRegistry>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
}

/// Indicador de progreso de la última acción de una sesión.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub state: StatusState,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
    /// Chunks recuperados para la consulta en curso.
    pub citations: Vec<String>,
    /// Último documento indexado con éxito desde la sesión.
    pub document: Option<String>,
}

impl Status {
    pub fn running(&mut self, message: &str, progress: f32) {
        self.is_busy = true;
        self.state = StatusState::Running;
        self.message = message.to_string();
        self.progress = progress;
    }

    pub fn complete(&mut self, message: &str) {
        self.is_busy = false;
        self.state = StatusState::Complete;
        self.message = message.to_string();
        self.progress = 1.0;
    }

    pub fn failed(&mut self, message: String) {
        self.is_busy = false;
        self.state = StatusState::Error;
        self.message = message;
        self.progress = 0.0;
    }
}

/// Sesión activa: el estado de chat bajo un mutex asíncrono que se mantiene
/// durante toda la acción, y el estado de progreso aparte para poder
/// consultarlo mientras la acción corre.
pub struct SessionHandle {
    pub id: Uuid,
    pub(crate) chat: tokio::sync::Mutex<ChatSession>,
    status: Mutex<Status>,
    last_seen: Mutex<Instant>,
}

impl SessionHandle {
    pub fn new(id: Uuid, history_limit: Option<usize>) -> Self {
        Self {
            id,
            chat: tokio::sync::Mutex::new(ChatSession::new(history_limit)),
            status: Mutex::new(Status {
                message: "Upload a PDF to get started.".to_string(),
                ..Default::default()
            }),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Sin acción en curso y sin peticiones desde hace más de `idle_timeout`.
    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_seen) > idle_timeout && self.chat.try_lock().is_ok()
    }

    pub fn status(&self) -> Status {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update_status(&self, update: impl FnOnce(&mut Status)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut status);
    }
}

/// Sesiones vivas del proceso. Terminar una sesión (explícitamente o por
/// inactividad) descarta su historial.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<SessionHandle>>>,
    history_limit: Option<usize>,
}

impl SessionRegistry {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    pub fn create(&self) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(Uuid::new_v4(), self.history_limit));
        self.lock().insert(handle.id, handle.clone());
        handle
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        let handle = self
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| RagError::UnknownSession(id.to_string()))?;
        handle.touch();
        Ok(handle)
    }

    pub fn end(&self, id: Uuid) -> Result<()> {
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RagError::UnknownSession(id.to_string()))
    }

    /// Descarta las sesiones inactivas y devuelve cuántas se eliminaron.
    pub fn sweep_idle(&self, now: Instant, idle_timeout: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_idle(now, idle_timeout));
        before - sessions.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Barre periódicamente las sesiones inactivas mientras viva el proceso.
pub fn spawn_idle_sweeper(sessions: Arc<SessionRegistry>, idle_timeout: Duration) -> JoinHandle<()> {
    let period = idle_timeout.min(MAX_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = sessions.sweep_idle(Instant::now(), idle_timeout);
            if expired > 0 {
                info!(expired, "idle sessions discarded");
            }
        }
    })
}
