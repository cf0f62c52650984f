//! Machine à états de la session
//!
//! ```text
//! ready ──start──▶ active ◀──resume── paused
//!                    │  └────pause────▶  │
//!                    └──────end──▶ ending ◀──end──┘
//!                                    │
//!                                  ended
//! ```
//!
//! Un échec pendant `start()` ramène la machine en `ready`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// États du cycle de vie d'une session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Pas de session distante, capture arrêtée
    Ready = 0,
    /// Session distante ouverte, capture et polling en cours
    Active = 1,
    /// Session distante ouverte, capture arrêtée, audio vidé
    Paused = 2,
    /// Terminaison en cours
    Ending = 3,
    /// Terminal : toutes les ressources sont libérées
    Ended = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Ready,
            1 => SessionState::Active,
            2 => SessionState::Paused,
            3 => SessionState::Ending,
            _ => SessionState::Ended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Ready => "ready",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Ending => "ending",
            SessionState::Ended => "ended",
        }
    }

    /// Vérifie si la transition `self → next` est légale
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Ready, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Ending)
                | (Paused, Ending)
                | (Ending, Ended)
                // Abandon pendant le démarrage
                | (Active, Ready)
                | (Paused, Ready)
        )
    }

    /// La session distante est censée exister dans cet état
    pub fn has_remote_session(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Paused | SessionState::Ending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ending | SessionState::Ended)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cellule d'état partagée
///
/// Lue par le pipeline de capture à chaque chunk : la lecture voit toujours
/// la dernière écriture, jamais une copie capturée plus tôt.
#[derive(Clone, Debug)]
pub struct StateCell {
    inner: Arc<AtomicU8>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(SessionState::Ready)
    }
}

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self { inner: Arc::new(AtomicU8::new(state as u8)) }
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Applique une transition si elle part de `from`
    ///
    /// Retourne `false` (sans rien modifier) si l'état courant n'est pas
    /// `from` ou si la transition est illégale.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }

        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force l'état, sans contrôle de légalité (teardown)
    pub fn force(&self, state: SessionState) {
        self.inner.store(state as u8, Ordering::Release);
    }
}
