//! Envoi de l'audio capturé et commit des énoncés
//!
//! Le committer accumule les chunks, les envoie par blocs d'environ 100ms
//! et signale la fin d'un énoncé après un silence :
//!
//! 1. `push()` ajoute un chunk ; au-delà du seuil, le buffer est fusionné,
//!    encodé en base64 et envoyé
//! 2. chaque `push()` relance la minuterie de commit
//! 3. sans nouveau chunk avant l'échéance, le reste du buffer est envoyé
//!    puis un commit part
//!
//! Le verrou du buffer est tenu pendant l'envoi et le commit : les envois
//! partent dans l'ordre de capture et un commit ne double jamais un envoi.

use audio::{AudioChunk, AudioCodec, Pcm16Codec};
use network::{HandleCell, VoiceBackend};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{ChunkBuffer, DebounceTimer, SessionObserver, TransportOperation};

/// Statistiques du committer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitterStats {
    /// Blocs audio envoyés avec succès
    pub flushes: u64,

    /// Octets PCM16 envoyés (avant base64)
    pub bytes_sent: u64,

    /// Commits acceptés par l'agent
    pub commits: u64,

    pub failed_sends: u64,
    pub failed_commits: u64,

    /// Chunks abandonnés faute de session distante
    pub chunks_without_handle: u64,

    /// Chunks abandonnés par `discard()`
    pub chunks_discarded: u64,
}

/// Contenu protégé par le verrou d'envoi
struct Pending {
    buffer: ChunkBuffer,

    /// De l'audio a été envoyé depuis le dernier commit
    uncommitted: bool,
}

struct CommitterInner {
    backend: Arc<dyn VoiceBackend>,
    handle: HandleCell,
    observer: Arc<dyn SessionObserver>,
    codec: Pcm16Codec,
    pending: tokio::sync::Mutex<Pending>,
    timer: DebounceTimer,
    stats: Mutex<CommitterStats>,
}

impl CommitterInner {
    fn stats(&self) -> MutexGuard<'_, CommitterStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fusionne et envoie le contenu du buffer
    async fn send_buffered(&self, pending: &mut Pending) {
        let chunk_count = pending.buffer.len() as u64;
        let Some(merged) = pending.buffer.take_merged() else {
            return;
        };

        let Some(handle) = self.handle.get() else {
            self.stats().chunks_without_handle += chunk_count;
            debug!(chunks = chunk_count, "pas de session distante, audio abandonné");
            return;
        };

        let bytes = merged.len();
        let payload = self.codec.encode(&merged);

        match self.backend.send_audio(&handle, payload).await {
            Ok(()) => {
                pending.uncommitted = true;
                let mut stats = self.stats();
                stats.flushes += 1;
                stats.bytes_sent += bytes as u64;
                debug!(bytes, chunks = chunk_count, "audio envoyé");
            }
            Err(e) => {
                self.stats().failed_sends += 1;
                self.observer.on_transport_error(TransportOperation::SendAudio, &e);
            }
        }
    }

    /// Envoie un commit si de l'audio est parti depuis le dernier
    async fn commit_if_needed(&self, pending: &mut Pending) -> bool {
        if !pending.uncommitted {
            return false;
        }
        // L'audio non commité est perdu pour l'agent, qu'on réussisse ou non
        pending.uncommitted = false;

        let Some(handle) = self.handle.get() else {
            return false;
        };

        match self.backend.commit(&handle).await {
            Ok(()) => {
                self.stats().commits += 1;
                debug!(session = %handle, "énoncé commité");
                true
            }
            Err(e) => {
                self.stats().failed_commits += 1;
                self.observer.on_transport_error(TransportOperation::Commit, &e);
                false
            }
        }
    }

    async fn flush_then_commit(&self) -> bool {
        let mut pending = self.pending.lock().await;
        self.send_buffered(&mut pending).await;
        self.commit_if_needed(&mut pending).await
    }
}

/// Buffer de chunks avec envoi au seuil et commit après silence
///
/// Clonable : les clones partagent le même buffer et la même minuterie.
#[derive(Clone)]
pub struct ChunkCommitter {
    inner: Arc<CommitterInner>,
}

impl ChunkCommitter {
    /// # Arguments
    /// * `threshold_bytes` - taille de buffer déclenchant un envoi
    /// * `commit_delay` - silence après lequel l'énoncé est commité
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        handle: HandleCell,
        observer: Arc<dyn SessionObserver>,
        threshold_bytes: usize,
        commit_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CommitterInner {
                backend,
                handle,
                observer,
                codec: Pcm16Codec::new(),
                pending: tokio::sync::Mutex::new(Pending {
                    buffer: ChunkBuffer::new(threshold_bytes),
                    uncommitted: false,
                }),
                timer: DebounceTimer::new(commit_delay),
                stats: Mutex::new(CommitterStats::default()),
            }),
        }
    }

    /// Ajoute un chunk capturé
    ///
    /// Sans session distante, le chunk est abandonné.
    pub async fn push(&self, chunk: AudioChunk) {
        if !self.inner.handle.is_set() {
            self.inner.stats().chunks_without_handle += 1;
            return;
        }

        {
            let mut pending = self.inner.pending.lock().await;
            if pending.buffer.push(chunk) {
                self.inner.send_buffered(&mut pending).await;
            }
        }

        self.schedule_commit();
    }

    /// Relance la minuterie de commit
    fn schedule_commit(&self) {
        // Weak : la minuterie ne garde pas le committer en vie
        let inner: Weak<CommitterInner> = Arc::downgrade(&self.inner);

        self.inner.timer.schedule(move || async move {
            if let Some(inner) = inner.upgrade() {
                inner.flush_then_commit().await;
            }
        });
    }

    /// Envoie le reste du buffer puis commit, sans attendre la minuterie
    ///
    /// Sans audio envoyé depuis le dernier commit, aucun commit ne part.
    /// Retourne `true` si un commit a été accepté.
    pub async fn flush_and_commit(&self) -> bool {
        self.inner.timer.cancel();
        self.inner.flush_then_commit().await
    }

    /// Abandonne le buffer sans rien envoyer
    ///
    /// Retourne le nombre de chunks perdus.
    pub async fn discard(&self) -> usize {
        self.inner.timer.cancel();

        let mut pending = self.inner.pending.lock().await;
        let dropped = pending.buffer.clear();
        pending.uncommitted = false;

        if dropped > 0 {
            warn!(chunks = dropped, "audio non envoyé abandonné");
            self.inner.stats().chunks_discarded += dropped as u64;
        }
        dropped
    }

    /// Annule la minuterie de commit ; retourne `true` si elle attendait
    pub fn cancel_timer(&self) -> bool {
        self.inner.timer.cancel()
    }

    pub fn has_pending_commit(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Octets en attente dans le buffer (0 si un envoi est en cours)
    pub fn buffered_bytes(&self) -> usize {
        self.inner
            .pending
            .try_lock()
            .map(|pending| pending.buffer.total_bytes())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CommitterStats {
        self.inner.stats().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TracingObserver;
    use network::{BackendOperation, SessionParams, SimulatedBackend};

    const DELAY: Duration = Duration::from_millis(500);

    async fn committer(threshold: usize) -> (ChunkCommitter, Arc<SimulatedBackend>, HandleCell) {
        let backend = Arc::new(SimulatedBackend::new());
        let handle = HandleCell::new();
        let created = backend.create_session(&SessionParams::default()).await.unwrap();
        handle.set(created.handle);

        let committer = ChunkCommitter::new(backend.clone(), handle.clone(), Arc::new(TracingObserver), threshold, DELAY);
        (committer, backend, handle)
    }

    fn chunk(bytes: usize) -> AudioChunk {
        AudioChunk::new(vec![0x11; bytes], 0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_triggers_send() {
        let (committer, backend, _) = committer(10).await;

        committer.push(chunk(4)).await;
        committer.push(chunk(4)).await;
        assert_eq!(backend.count(BackendOperation::SendAudio), 0);
        assert_eq!(committer.buffered_bytes(), 8);

        committer.push(chunk(4)).await;
        assert_eq!(backend.count(BackendOperation::SendAudio), 1);
        assert_eq!(committer.buffered_bytes(), 0);
        assert_eq!(committer.stats().bytes_sent, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_flushes_then_commits_once() {
        let (committer, backend, _) = committer(4800).await;

        for _ in 0..10 {
            committer.push(chunk(100)).await;
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(backend.count(BackendOperation::Commit), 0);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(backend.count(BackendOperation::SendAudio), 1);
        assert_eq!(backend.count(BackendOperation::Commit), 1);
        assert!(!committer.has_pending_commit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_flush_cancels_timer() {
        let (committer, backend, _) = committer(4800).await;

        committer.push(chunk(10)).await;
        assert!(committer.has_pending_commit());
        assert!(committer.flush_and_commit().await);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(backend.count(BackendOperation::Commit), 1);

        // Rien de neuf : pas de second commit
        assert!(!committer.flush_and_commit().await);
        assert_eq!(backend.count(BackendOperation::Commit), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_reported_not_fatal() {
        let (committer, backend, _) = committer(4).await;
        backend.set_failing(BackendOperation::SendAudio, true);

        committer.push(chunk(4)).await;
        assert_eq!(committer.stats().failed_sends, 1);

        // Rien n'a été envoyé, donc rien à commiter
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(backend.count(BackendOperation::Commit), 0);

        backend.set_failing(BackendOperation::SendAudio, false);
        committer.push(chunk(4)).await;
        assert_eq!(committer.stats().flushes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_handle_drops_audio() {
        let (committer, backend, handle) = committer(4).await;
        handle.clear();

        committer.push(chunk(8)).await;
        tokio::time::sleep(DELAY * 2).await;

        assert_eq!(committer.stats().chunks_without_handle, 1);
        assert_eq!(backend.count(BackendOperation::SendAudio), 0);
        assert!(!committer.has_pending_commit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard() {
        let (committer, backend, _) = committer(4800).await;

        committer.push(chunk(10)).await;
        committer.push(chunk(10)).await;
        assert_eq!(committer.discard().await, 2);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(backend.count(BackendOperation::SendAudio), 0);
        assert_eq!(backend.count(BackendOperation::Commit), 0);
        assert_eq!(committer.stats().chunks_discarded, 2);
    }
}
