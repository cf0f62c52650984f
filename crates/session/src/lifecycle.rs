//! Rapport de nettoyage
//!
//! Le teardown enchaîne des étapes indépendantes : l'échec de l'une
//! n'empêche jamais les suivantes. Le rapport dit ce qui a tourné.

use std::fmt;
use tracing::warn;

/// Étapes du teardown, dans leur ordre d'exécution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupStep {
    CancelCommitTimer,
    FlushAudio,
    DiscardAudio,
    StopPoller,
    StopCapture,
    ReleasePlayback,
    EndRemoteSession,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupStep::CancelCommitTimer => "annulation du commit différé",
            CleanupStep::FlushAudio => "envoi de l'audio restant",
            CleanupStep::DiscardAudio => "abandon de l'audio restant",
            CleanupStep::StopPoller => "arrêt du polling",
            CleanupStep::StopCapture => "arrêt de la capture",
            CleanupStep::ReleasePlayback => "libération de la sortie audio",
            CleanupStep::EndRemoteSession => "fin de la session distante",
        };
        f.write_str(name)
    }
}

/// Traitement de l'audio encore en buffer au moment du teardown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownMode {
    /// Envoyer le reste puis commiter (fin normale, pause)
    Flush,
    /// Abandonner sans attendre le réseau (démontage, échec au démarrage)
    Discard,
}

/// Résultat d'un teardown
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CleanupReport {
    completed: Vec<CleanupStep>,
    failed: Vec<(CleanupStep, String)>,
    skipped: Vec<CleanupStep>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre le résultat d'une étape ; un échec est loggé, jamais propagé
    pub fn record<E: fmt::Display>(&mut self, step: CleanupStep, result: Result<(), E>) {
        match result {
            Ok(()) => self.completed.push(step),
            Err(e) => {
                warn!(step = %step, error = %e, "étape de nettoyage en échec");
                self.failed.push((step, e.to_string()));
            }
        }
    }

    pub fn done(&mut self, step: CleanupStep) {
        self.completed.push(step);
    }

    /// Étape sans objet (ex: pas de session distante à terminer)
    pub fn skip(&mut self, step: CleanupStep) {
        self.skipped.push(step);
    }

    pub fn completed(&self) -> &[CleanupStep] {
        &self.completed
    }

    pub fn failed(&self) -> &[(CleanupStep, String)] {
        &self.failed
    }

    pub fn skipped(&self) -> &[CleanupStep] {
        &self.skipped
    }

    /// L'étape a été tentée, avec ou sans succès
    pub fn attempted(&self, step: CleanupStep) -> bool {
        self.completed.contains(&step) || self.failed.iter().any(|(failed, _)| *failed == step)
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
