// Debug session management
//
// One session per attached JVM. The session owns the connection and the
// evaluator whose thread table serializes evaluations on each thread.

use jdwp_client::JdwpConnection;
use jdwp_eval::{Evaluator, JdwpVm};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SessionId = String;

#[derive(Debug)]
pub struct DebugSession {
    pub vm: Arc<JdwpVm>,
    pub evaluator: Evaluator,
}

impl DebugSession {
    pub fn new(vm: JdwpVm) -> Self {
        let vm = Arc::new(vm);
        Self {
            evaluator: Evaluator::new(vm.clone()),
            vm,
        }
    }

    pub fn connection(&self) -> &JdwpConnection {
        self.vm.connection()
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<DebugSession>>>,
    current_session: Mutex<Option<SessionId>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self, vm: JdwpVm) -> SessionId {
        let session_id = format!("session_{}", uuid::v4());

        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), Arc::new(DebugSession::new(vm)));
        *self.current_session.lock().await = Some(session_id.clone());

        session_id
    }

    pub async fn get_current_session(&self) -> Option<Arc<DebugSession>> {
        let current = self.current_session.lock().await.clone()?;
        self.sessions.lock().await.get(&current).cloned()
    }

    pub async fn get_current_session_id(&self) -> Option<SessionId> {
        self.current_session.lock().await.clone()
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<DebugSession>> {
        let removed = self.sessions.lock().await.remove(session_id);

        let mut current = self.current_session.lock().await;
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
        removed
    }
}

// Simple unique ids for sessions
mod uuid {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(1);

    pub fn v4() -> String {
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        format!("{:x}{:x}", timestamp, counter)
    }
}
