// Affichage console de la conversation

use std::io::{self, Write};

use network::{NetworkError, SessionHandle, TranscriptFragment, TranscriptRole};
use session::{SessionObserver, SessionState, TransportOperation};
use tracing::warn;

/// Observateur qui affiche la conversation dans le terminal
///
/// Les transcriptions partielles s'écrivent au fil de l'eau sur la même
/// ligne ; la version finale termine la ligne.
#[derive(Default)]
pub struct ConsoleObserver;

impl ConsoleObserver {
    fn label(role: TranscriptRole) -> &'static str {
        match role {
            TranscriptRole::Assistant => "🤖",
            TranscriptRole::User => "🗣️ ",
        }
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_state_changed(&self, _from: SessionState, to: SessionState) {
        let icon = match to {
            SessionState::Ready => "⏹️ ",
            SessionState::Active => "🎙️ ",
            SessionState::Paused => "⏸️ ",
            SessionState::Ending => "🔌",
            SessionState::Ended => "👋",
        };
        println!("{} Session : {}", icon, to);
    }

    fn on_greeting(&self, text: &str) {
        println!("🤖 {}", text);
    }

    fn on_transcript(&self, fragment: TranscriptFragment<'_>) {
        if fragment.is_final {
            println!("\r{} {}", Self::label(fragment.role), fragment.text);
        } else {
            print!("{}", fragment.text);
            // Affichage best-effort
            let _ = io::stdout().flush();
        }
    }

    fn on_speaking_changed(&self, speaking: bool) {
        if speaking {
            println!("🔊 L'assistant parle...");
        }
    }

    fn on_remote_error(&self, message: &str) {
        println!("⚠️  Erreur de l'assistant : {}", message);
    }

    fn on_transport_error(&self, operation: TransportOperation, error: &NetworkError) {
        // Dégradation silencieuse : seulement dans les traces
        warn!(operation = operation.as_str(), %error, "erreur de transport");
    }

    fn on_session_lost(&self, handle: &SessionHandle) {
        println!("❌ La session {} a été fermée côté serveur (q pour quitter)", handle);
    }
}
