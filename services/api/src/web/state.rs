//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user registry of
//! in-flight pipeline runs.

use std::collections::HashMap;
use std::sync::Arc;
use syllabus_core::ports::ClassDirectory;
use syllabus_core::SyllabusPipeline;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SyllabusPipeline>,
    pub classes: Arc<dyn ClassDirectory>,
    pub runs: RunRegistry,
}

//=========================================================================================
// RunRegistry (One Active Run Per User)
//=========================================================================================

/// Handle to a registered run.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub key: Uuid,
    pub token: CancellationToken,
}

/// Keeps at most one live pipeline run per user. Starting a new run cancels
/// the previous one instead of queueing behind it.
#[derive(Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,
}

impl RunRegistry {
    /// Registers `key` as the user's live run and cancels whatever it replaces.
    pub async fn begin(&self, user_id: Uuid, key: Uuid) -> ActiveRun {
        let run = ActiveRun {
            key,
            token: CancellationToken::new(),
        };
        let mut active = self.active.lock().await;
        if let Some(previous) = active.insert(user_id, run.clone()) {
            previous.token.cancel();
        }
        run
    }

    /// Cancels the user's live run if it is still the one registered under
    /// `key`. Returns whether anything was cancelled.
    pub async fn cancel(&self, user_id: Uuid, key: Uuid) -> bool {
        let mut active = self.active.lock().await;
        match active.get(&user_id) {
            Some(run) if run.key == key => {
                run.token.cancel();
                active.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Forgets `run` unless a newer run has already replaced it.
    pub async fn finish(&self, user_id: Uuid, run: &ActiveRun) {
        let mut active = self.active.lock().await;
        if active.get(&user_id).map(|r| r.key) == Some(run.key) {
            active.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn live_key(registry: &RunRegistry, user: Uuid) -> Option<Uuid> {
        registry.active.lock().await.get(&user).map(|r| r.key)
    }

    #[tokio::test]
    async fn new_run_cancels_the_previous_one() {
        let registry = RunRegistry::default();
        let user = Uuid::new_v4();

        let first = registry.begin(user, Uuid::new_v4()).await;
        let second = registry.begin(user, Uuid::new_v4()).await;
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());

        // The superseded run finishing must not unregister its replacement.
        registry.finish(user, &first).await;
        assert_eq!(live_key(&registry, user).await, Some(second.key));
        registry.finish(user, &second).await;
        assert_eq!(live_key(&registry, user).await, None);
    }

    #[tokio::test]
    async fn stale_key_does_not_cancel_newer_run() {
        let registry = RunRegistry::default();
        let user = Uuid::new_v4();

        let socket_run = registry.begin(user, Uuid::new_v4()).await;
        let rest_run = registry.begin(user, Uuid::new_v4()).await;

        // The socket that started the first run disconnects afterwards.
        assert!(!registry.cancel(user, socket_run.key).await);
        assert!(!rest_run.token.is_cancelled());
        assert_eq!(live_key(&registry, user).await, Some(rest_run.key));

        assert!(registry.cancel(user, rest_run.key).await);
        assert!(rest_run.token.is_cancelled());
    }

    #[tokio::test]
    async fn runs_of_different_users_are_independent() {
        let registry = RunRegistry::default();
        let alice = registry.begin(Uuid::new_v4(), Uuid::new_v4()).await;
        let bob_id = Uuid::new_v4();
        let bob = registry.begin(bob_id, Uuid::new_v4()).await;

        assert!(registry.cancel(bob_id, bob.key).await);
        assert!(!alice.token.is_cancelled());
        assert!(!registry.cancel(bob_id, bob.key).await);
    }
}
