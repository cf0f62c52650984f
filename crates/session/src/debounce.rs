//! Minuterie de debounce annulable
//!
//! Au plus une action est en attente : `schedule()` annule toujours la
//! précédente avant d'en programmer une nouvelle.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Action différée, relancée à chaque nouvel événement
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: Mutex::new(None) }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Programme `action` après le délai, en annulant l'action en attente
    ///
    /// Une fois le délai écoulé, l'action tourne dans sa propre tâche :
    /// une annulation ultérieure ne l'interrompt pas en cours de route.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending();

        if let Some(previous) = pending.take() {
            previous.abort();
        }

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action());
        }));
    }

    /// Annule l'action en attente
    ///
    /// Retourne `true` si une action attendait encore son délai.
    pub fn cancel(&self) -> bool {
        match self.pending().take() {
            Some(task) => {
                let was_waiting = !task.is_finished();
                task.abort();
                was_waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending().as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
