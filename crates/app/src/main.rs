// Client de pratique vocale en ligne de commande
//
// Sous-commandes :
// - practice : conversation vocale avec l'agent distant
// - devices  : vérification du micro et des haut-parleurs

mod config;
mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use audio::{AudioCapture, CpalCapture, CpalOutputDevice, CpalPlayback, OutputContext};
use network::{utils, HttpVoiceBackend, SessionParams};
use session::{SessionError, SessionStats, VoiceSession};

use crate::config::{AppConfig, LoggingConfig};
use crate::console::ConsoleObserver;

#[derive(Parser)]
#[command(author, version, about = "Pratique orale avec un agent conversationnel")]
struct Cli {
    /// Fichier de configuration TOML
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lance une conversation (p: pause, r: reprise, q: fin)
    Practice {
        /// Sujet de conversation
        #[arg(short, long)]
        topic: String,

        /// Niveau de l'apprenant (ex: A2, B1)
        #[arg(short, long, default_value = "B1")]
        level: String,

        /// Objectif pédagogique (répétable)
        #[arg(short, long = "goal")]
        goals: Vec<String>,

        /// Voix de l'assistant
        #[arg(short, long, default_value = "alloy")]
        speaker: String,

        /// URL de l'agent vocal (remplace celle du fichier)
        #[arg(short, long)]
        url: Option<String>,

        /// Résumé d'une conversation précédente
        #[arg(long)]
        prior_context: Option<String>,
    },
    /// Affiche les périphériques audio par défaut
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut app_config = AppConfig::load(cli.config.as_deref())?;

    init_tracing(&app_config.logging)?;

    match cli.command {
        Commands::Practice { topic, level, goals, speaker, url, prior_context } => {
            if let Some(url) = url {
                app_config.session.network.base_url = url;
            }
            let params = SessionParams { topic, level, goals, speaker, prior_context };
            run_practice(app_config, params).await
        }
        Commands::Devices => show_devices(&app_config).await,
    }
}

/// Installe le subscriber tracing (`RUST_LOG` a priorité sur le fichier)
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("filtre de logs invalide")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
    Ok(())
}

/// Conversation interactive jusqu'à `q` ou Ctrl+C
async fn run_practice(app_config: AppConfig, params: SessionParams) -> anyhow::Result<()> {
    let config = app_config.session;
    config.validate()?;

    println!("🎤 Pratique orale : {} (niveau {})", params.topic, params.level);
    println!("📡 Agent : {}", config.network.base_url);

    let backend = Arc::new(HttpVoiceBackend::new(&config.network)?);
    let capture = CpalCapture::new(config.audio.clone()).context("microphone indisponible")?;
    let output = CpalOutputDevice::new(config.audio.clone());

    let session = VoiceSession::new(
        config,
        params,
        backend,
        Box::new(capture),
        Box::new(output),
        Arc::new(ConsoleObserver),
    )?;

    let started_at = Instant::now();
    match session.start().await {
        Ok(()) => {}
        Err(SessionError::PermissionDenied) => {
            println!("❌ Accès au microphone refusé");
            return Ok(());
        }
        Err(e) => return Err(e).context("démarrage de la session"),
    }

    println!("\n📋 Commandes : p = pause, r = reprise, q = terminer (ou Ctrl+C)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\n🛑 Interruption demandée");
                break;
            }

            line = lines.next_line() => {
                // Fin de stdin : même effet que `q`
                let Some(line) = line? else { break };

                match line.trim() {
                    "p" | "P" => match session.pause().await {
                        Ok(report) => debug!(?report, "pause"),
                        Err(e) => println!("⚠️  {}", e),
                    },
                    "r" | "R" => {
                        if let Err(e) = session.resume().await {
                            println!("⚠️  {}", e);
                        }
                    }
                    "q" | "Q" => break,
                    "" => {}
                    other => println!("❌ Commande inconnue : {}", other),
                }
            }
        }
    }

    match session.end().await {
        Ok(Some(report)) if !report.is_clean() => {
            for (step, error) in report.failed() {
                println!("⚠️  {} : {}", step, error);
            }
        }
        Ok(_) => {}
        Err(_) => {
            // Session jamais active (ou perdue au démarrage) : démontage simple
            session.shutdown().await;
        }
    }

    print_summary(&session.stats().await, started_at);
    info!("session terminée");
    Ok(())
}

fn print_summary(stats: &SessionStats, started_at: Instant) {
    println!("\n📊 Résumé :");
    println!("   🕐 Durée : {}", utils::format_duration(started_at.elapsed()));
    println!(
        "   📤 Audio envoyé : {} en {} blocs",
        utils::format_bytes(stats.committer.bytes_sent),
        stats.committer.flushes
    );
    println!("   ✅ Énoncés commités : {}", stats.committer.commits);
    println!(
        "   🔊 Réponses jouées : {} chunks ({:.1}s)",
        stats.playback.chunks_scheduled, stats.playback.seconds_scheduled
    );

    let failures = stats.committer.failed_sends + stats.committer.failed_commits + stats.poller.errors;
    if failures > 0 {
        println!("   ⚠️  Erreurs réseau ignorées : {}", failures);
    }
    if stats.playback.chunks_dropped > 0 {
        println!("   ⚠️  Chunks audio illisibles : {}", stats.playback.chunks_dropped);
    }
}

/// Vérifie micro et haut-parleurs sans contacter l'agent
async fn show_devices(app_config: &AppConfig) -> anyhow::Result<()> {
    let audio_config = &app_config.session.audio;

    println!("🔧 Format : {} Hz, mono, PCM16", audio_config.sample_rate);

    print!("🎤 Microphone... ");
    match CpalCapture::new(audio_config.clone()) {
        Ok(mut capture) => {
            let usable = capture.request_permission().await;
            println!("{} {}", if usable { "✅" } else { "❌" }, capture.device_info());
        }
        Err(e) => println!("❌ {}", e),
    }

    print!("🔊 Haut-parleurs... ");
    match CpalPlayback::new(audio_config.clone()) {
        Ok(playback) => println!("✅ {}", playback.device_info()),
        Err(e) => println!("❌ {}", e),
    }

    println!("📦 network {}", network::VERSION);
    Ok(())
}
