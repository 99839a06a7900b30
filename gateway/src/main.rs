use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use aig_probe::config::{ConfigStore, GatewayConfig, StoredConfig};
use aig_probe::core::audio::FileCapture;
use aig_probe::core::http::{ChatClient, ChatOptions};
use aig_probe::core::realtime::{
    REALTIME_SAMPLE_RATE, RealtimeClient, RealtimeEvent, RealtimeEvents, SessionOptions,
};
use aig_probe::core::{ConversationLog, GatewayError};

/// Persisted record used when `--store` is not given.
const DEFAULT_STORE_FILE: &str = ".aig-probe.json";

/// How long the probe waits for a realtime socket to settle.
const PROBE_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// aig-probe - Cloudflare AI Gateway client over HTTP and WebSocket
#[derive(Parser, Debug)]
#[command(name = "aig-probe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Persisted configuration record, used as the lowest-priority source
    #[arg(short = 's', long = "store", value_name = "FILE")]
    store: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat over the HTTP transport
    Chat {
        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Model override for this session
        #[arg(short = 'm', long = "model")]
        model: Option<String>,

        /// System prompt seeding the conversation
        #[arg(long)]
        system: Option<String>,
    },

    /// Interactive session over the realtime WebSocket transport
    Realtime {
        /// Offer the provider key inline as a subprotocol
        #[arg(long)]
        insecure: bool,

        /// Raw PCM16 24kHz mono file sent as one spoken turn after connecting
        #[arg(long = "audio-file", value_name = "FILE")]
        audio_file: Option<PathBuf>,

        /// Disable audio output and ask for text responses only
        #[arg(long)]
        text_only: bool,
    },

    /// Reproduce the gateway's realtime authentication asymmetry
    Probe,

    /// Persist the resolved configuration for later runs
    SaveConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let store = ConfigStore::new(
        cli.store
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE)),
    );
    let stored = store.load()?;
    if stored.is_some() {
        info!("Using persisted configuration from {}", store.path().display());
    }

    if let Some(config_path) = &cli.config {
        println!("Loading configuration from {}", config_path.display());
    }
    let config = GatewayConfig::load(cli.config.as_deref(), stored.as_ref())?;

    match cli.command {
        Commands::Chat {
            stream,
            model,
            system,
        } => run_chat(config, stream, model, system).await,
        Commands::Realtime {
            insecure,
            audio_file,
            text_only,
        } => run_realtime(config, insecure, audio_file, text_only).await,
        Commands::Probe => run_probe(config).await,
        Commands::SaveConfig => {
            store.save(&StoredConfig::from_config(&config))?;
            println!("Configuration saved to {}", store.path().display());
            Ok(())
        }
    }
}

async fn run_chat(
    config: GatewayConfig,
    stream: bool,
    model: Option<String>,
    system: Option<String>,
) -> anyhow::Result<()> {
    let mut client = ChatClient::new(config)?;
    if let Some(model) = model {
        client.set_model(model);
    }
    let mut log = match system {
        Some(prompt) => ConversationLog::with_system(prompt),
        None => ConversationLog::new(),
    };
    let options = ChatOptions {
        stream,
        ..Default::default()
    };

    println!(
        "Chatting with {} via {} (/model <name>, /reset, /quit)",
        client.config().model,
        client.config().chat_completions_url()?
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                log.clear();
                println!("Conversation cleared");
                continue;
            }
            _ => {}
        }
        if let Some(name) = line.strip_prefix("/model ") {
            client.set_model(name.trim());
            println!("Model set to {}", client.config().model);
            continue;
        }

        let result = if stream {
            let mut print = |delta: &str| {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            };
            client
                .send_streaming(&mut log, line, &options, &mut print)
                .await
                .map(|_| println!())
        } else {
            client
                .send(&mut log, line, &options)
                .await
                .map(|reply| println!("{}", reply.content))
        };

        if let Err(e) = result {
            eprintln!("Error: {e}");
        }
    }
    Ok(())
}

async fn run_realtime(
    mut config: GatewayConfig,
    insecure: bool,
    audio_file: Option<PathBuf>,
    text_only: bool,
) -> anyhow::Result<()> {
    if insecure {
        config.insecure_subprotocol = true;
        config.validate()?;
    }
    let options = if text_only {
        SessionOptions::default().text_only()
    } else {
        SessionOptions::default()
    };

    let client = RealtimeClient::new(config, options);
    let events = client
        .events()
        .ok_or_else(|| anyhow!("realtime event stream already taken"))?;
    let printer = tokio::spawn(print_events(events));

    client.connect().await?;
    println!("Connected; type a message (/quit to leave)");

    if let Some(path) = audio_file {
        send_audio_file(&client, &path).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Err(e) = client.send_text(line).await {
            eprintln!("Error: {e}");
            if !client.is_connected() {
                break;
            }
        }
    }

    client.disconnect().await?;
    drop(client);
    printer.abort();
    Ok(())
}

/// Stream a PCM file as one user turn, paced roughly at real time.
async fn send_audio_file(client: &RealtimeClient, path: &Path) -> anyhow::Result<()> {
    let len = tokio::fs::metadata(path).await?.len();
    let bytes_per_second = u64::from(REALTIME_SAMPLE_RATE) * 2;
    let duration = Duration::from_millis(len.saturating_mul(1000) / bytes_per_second);

    client
        .start_recording(Box::new(FileCapture::new(path)))
        .await?;
    info!("Streaming {} ({:?} of audio)", path.display(), duration);
    tokio::time::sleep(duration + Duration::from_millis(200)).await;
    client.stop_recording().await?;
    Ok(())
}

async fn print_events(mut events: RealtimeEvents) {
    while let Some(event) = events.next().await {
        match event {
            RealtimeEvent::TextDelta { delta } | RealtimeEvent::AudioTranscriptDelta { delta } => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            RealtimeEvent::AssistantMessage { .. } => println!(),
            RealtimeEvent::InputTranscriptionCompleted { transcript, .. } => {
                println!("[you] {transcript}");
            }
            RealtimeEvent::ConversationInterrupted => println!("[interrupted]"),
            RealtimeEvent::Error { message, .. } => eprintln!("[error] {message}"),
            RealtimeEvent::Closed {
                code,
                reason,
                diagnosis,
            } => {
                match diagnosis {
                    Some(d) => println!("[closed {code}] {d}"),
                    None => println!("[closed {code}] {reason}"),
                }
                break;
            }
            _ => {}
        }
    }
}

async fn run_probe(config: GatewayConfig) -> anyhow::Result<()> {
    println!("Probing {}", config.effective_host());

    // 1. HTTP with the gateway token in its header
    let mut http_config = config.clone();
    if http_config.auth_token.is_some() {
        http_config.gateway_auth = true;
    }
    let client = ChatClient::new(http_config)?;
    let mut log = ConversationLog::new();
    let options = ChatOptions {
        max_tokens: 16,
        ..Default::default()
    };
    match client.send(&mut log, "ping", &options).await {
        Ok(_) => println!("HTTP  (gateway header)         : ok"),
        Err(e) => println!("HTTP  (gateway header)         : failed: {e}"),
    }

    // 2. WebSocket offering only the gateway token
    let mut gateway_only = config.clone();
    gateway_only.insecure_subprotocol = false;
    let outcome = probe_realtime(gateway_only).await;
    println!("WS    (gateway token only)     : {outcome}");

    // 3. WebSocket with the inline provider key
    if config.api_key.is_none() {
        println!("WS    (insecure subprotocol)   : skipped: no API key configured");
    } else {
        let mut insecure = config;
        insecure.insecure_subprotocol = true;
        let outcome = probe_realtime(insecure).await;
        println!("WS    (insecure subprotocol)   : {outcome}");
    }
    Ok(())
}

/// Connect, wait for the session to be acknowledged or closed, and describe what happened.
async fn probe_realtime(config: GatewayConfig) -> String {
    let client = RealtimeClient::new(config, SessionOptions::default().text_only());
    let Some(mut events) = client.events() else {
        return "failed: event stream unavailable".to_string();
    };

    if let Err(e) = client.connect().await {
        return match e {
            GatewayError::Connect {
                diagnosis: Some(d), ..
            } => format!("handshake failed: {d}"),
            other => format!("handshake failed: {other}"),
        };
    }

    let settled = tokio::time::timeout(PROBE_SETTLE_TIMEOUT, async {
        while let Some(event) = events.next().await {
            match event {
                RealtimeEvent::SessionUpdated => return "ok: session accepted".to_string(),
                RealtimeEvent::Closed {
                    code,
                    diagnosis: Some(d),
                    ..
                } => return format!("closed {code}: {d}"),
                RealtimeEvent::Closed { code, reason, .. } => {
                    return format!("closed {code}: {reason}");
                }
                _ => {}
            }
        }
        "failed: event stream ended".to_string()
    })
    .await;

    if let Err(e) = client.disconnect().await {
        warn!("Probe disconnect failed: {}", e);
    }
    settled.unwrap_or_else(|_| "inconclusive: no session acknowledgement in time".to_string())
}
