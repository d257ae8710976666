// SynthNet Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synthnet_voice::config::Settings;
use synthnet_voice::game::{GameIdentity, DEFAULT_GAME, DEFAULT_NPC};
use synthnet_voice::server;
use synthnet_voice::state::KernelState;

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,whisper_rs=warn";

#[derive(Parser)]
#[command(name = "synthnet-voice")]
#[command(about = "SynthNet NPC voice service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the port from SYNTHNET_BIND
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List installed synthesizer voices
    Voices,

    /// Speak text on the default output, or render it to a wave file
    Speak {
        #[arg(short, long)]
        text: String,

        /// Voice id fragment (e.g. "jane")
        #[arg(short, long)]
        voice: Option<String>,

        /// Write a 22050 Hz mono wave here instead of playing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transcribe a wave file
    Transcribe {
        #[arg(short, long)]
        file: String,
    },

    /// Print the instructions configured for an NPC
    Instruction {
        #[arg(short, long, default_value = DEFAULT_GAME)]
        game: String,

        #[arg(short, long, default_value = DEFAULT_NPC)]
        npc: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Log panics instead of crashing silently
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        tracing::error!("[SYSTEM] Panic at {}: {}", location, message);
        eprintln!("🚨 [SYNTHNET PANIC] at {}: {}", location, message);
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;

    info!("--- SYNTHNET VOICE v{} ---", env!("CARGO_PKG_VERSION"));
    settings.log_summary();

    match cli.command {
        Commands::Serve { port } => {
            let settings = match port {
                Some(port) => settings.with_port(port),
                None => settings,
            };
            settings
                .ensure_dirs()
                .context("could not create data directories")?;
            if !settings.log_template.is_file() {
                warn!(
                    "[CONFIG] Log template {:?} is missing; scribe requests will fail with 404",
                    settings.log_template
                );
            }

            let state = Arc::new(KernelState::from_settings(&settings)?);
            server::start_server(state.clone(), settings.bind).await?;
            info!(
                "[SERVER] Stopped after {}s, {} heartbeats",
                state.health.uptime_secs(),
                state.health.heartbeat_count()
            );
        }

        Commands::Voices => {
            let state = KernelState::from_settings(&settings)?;
            for voice in state.core.list_voices().await? {
                println!("{:<28} {:<10} {:<8} {}", voice.id, voice.culture, voice.gender, voice.name);
            }
        }

        Commands::Speak {
            text,
            voice,
            output,
        } => {
            let state = KernelState::from_settings(&settings)?;
            let synth = &state.core.services().synthesizer;
            let voice = match voice {
                Some(fragment) => Some(synth.directory().find_voice(&fragment).await?.id),
                None => None,
            };
            match output {
                Some(path) => {
                    let summary = synth.synthesize_to_file(&text, voice.as_deref(), &path).await?;
                    info!("[TTS] Wrote {:?} ({} ms)", path, summary.duration_ms);
                }
                None => {
                    synth.speak(&text, voice.as_deref()).await?;
                }
            }
        }

        Commands::Transcribe { file } => {
            let state = KernelState::from_settings(&settings)?;
            let script = state.core.transcribe(&file).await?;
            println!("{}", script.text);
        }

        Commands::Instruction { game, npc } => {
            let state = KernelState::from_settings(&settings)?;
            let identity = GameIdentity::new(&game, &npc)?;
            let instruction = state.core.get_instruction(&identity).await?;
            println!("{}", serde_json::to_string_pretty(&instruction)?);
        }
    }

    Ok(())
}
