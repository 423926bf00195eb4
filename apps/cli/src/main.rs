use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, presentation, ClientEvent, ShopClient};
use livekit_integration::{
    inspect_join_token, LiveKitRoomConnector, MissingLiveKitConnector, ScriptedRoomConnector,
};
use shared::{
    domain::{CartItem, Product, SessionPhase, TranscriptMessage},
    protocol::ChatTurn,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "salesvoice", about = "Talk to the Salesvoice shopping agent")]
struct Cli {
    /// Overrides `backend_url` from salesvoice.toml and the environment.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the voice room and follow the transcript and cart.
    Session {
        /// Replay a recorded room session (JSON Lines) instead of a live room.
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    Products {
        #[arg(long)]
        json: bool,
    },
    /// Fetch a join credential and show its claims.
    Token,
    Transcribe {
        file: PathBuf,
    },
    Chat {
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings().with_backend_url(cli.backend_url.clone());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!(backend_url = %settings.backend_url, "cli: settings loaded");

    match cli.command {
        Command::Session { replay } => {
            let connector: Arc<dyn LiveKitRoomConnector> = match replay {
                Some(path) => Arc::new(
                    ScriptedRoomConnector::load(&path)
                        .await
                        .with_context(|| format!("loading replay {}", path.display()))?,
                ),
                None => Arc::new(MissingLiveKitConnector),
            };
            let client = ShopClient::from_settings(&settings, connector)?;
            run_session(client).await?;
        }
        Command::Products { json } => {
            let client = ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector))?;
            let products = client.load_catalog().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else {
                for product in &products {
                    println!("{}", product_line(product));
                }
            }
        }
        Command::Token => {
            let client = ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector))?;
            let credentials = client.bootstrap().await?;
            println!("livekit_url: {}", credentials.livekit_url);
            match inspect_join_token(&credentials.token) {
                Ok(claims) => {
                    println!("identity:    {}", claims.identity().unwrap_or("-"));
                    println!("room:        {}", claims.room().unwrap_or("-"));
                    match claims.expires_at() {
                        Some(expires_at) => println!("expires_at:  {expires_at}"),
                        None => println!("expires_at:  -"),
                    }
                }
                Err(err) => println!("token claims unreadable: {err}"),
            }
        }
        Command::Transcribe { file } => {
            let audio = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            if audio.is_empty() {
                bail!("{} is empty", file.display());
            }
            let filename = file.file_name().and_then(|name| name.to_str());
            let mime_type = mime_guess::from_path(&file).first_raw();
            let client = ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector))?;
            let transcript = client
                .transcribe_recording(audio, filename, mime_type)
                .await?;
            println!("{transcript}");
        }
        Command::Chat { message } => {
            let client = ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector))?;
            let reply = client.chat(vec![ChatTurn::user(message.join(" "))]).await?;
            println!("{reply}");
        }
    }

    Ok(())
}

async fn run_session(client: Arc<ShopClient>) -> Result<()> {
    let mut events = client.subscribe_events();
    println!("{}", presentation::LOADING_TEXT);
    client.bootstrap().await?;
    client.start().await?;
    println!("{}", presentation::EMPTY_TRANSCRIPT_TEXT);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("cli: interrupted, leaving room");
                client.stop().await?;
                break;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::PhaseChanged(SessionPhase::Disconnected)) => {
                    println!("Session ended.");
                    break;
                }
                Ok(event) => {
                    for line in render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "cli: dropped client events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let snapshot = client.snapshot().await;
    println!(
        "{} messages, cart total {}",
        snapshot.state.transcript().len(),
        presentation::format_inr(snapshot.state.cart_total())
    );
    Ok(())
}

fn product_line(product: &Product) -> String {
    format!(
        "{} {} ({}) · {} · {}",
        presentation::icon_for(product),
        product.name,
        product.category,
        presentation::stock_label(product),
        presentation::format_inr(product.price)
    )
}

fn transcript_line(message: &TranscriptMessage) -> String {
    format!("[{}] {}", message.role.label(), message.content)
}

fn cart_lines(items: &[CartItem], total: f64) -> Vec<String> {
    if items.is_empty() {
        return vec![presentation::EMPTY_CART_TEXT.to_string()];
    }
    let mut lines = vec![format!(
        "{} ({})",
        presentation::CART_HEADING,
        presentation::format_inr(total)
    )];
    lines.extend(items.iter().map(|item| {
        format!(
            "  {} {}  {}",
            item.product.name,
            presentation::line_breakdown(item),
            presentation::format_inr(item.line_total())
        )
    }));
    lines
}

fn render_event(event: &ClientEvent) -> Vec<String> {
    match event {
        ClientEvent::PhaseChanged(SessionPhase::Connected) => {
            vec![format!("Connected. {}", presentation::APP_SUBTITLE)]
        }
        ClientEvent::PhaseChanged(_) | ClientEvent::AudioLevelsUpdated(_) => Vec::new(),
        ClientEvent::CatalogLoaded(products) => {
            let mut lines = vec![presentation::CATALOG_HEADING.to_string()];
            lines.extend(products.iter().map(|p| format!("  {}", product_line(p))));
            lines
        }
        ClientEvent::TranscriptAppended(message) => vec![transcript_line(message)],
        ClientEvent::CartUpdated { items, total } => cart_lines(items, *total),
        ClientEvent::SuccessOverlayChanged(true) => vec![format!(
            "{} {}",
            presentation::SUCCESS_TITLE,
            presentation::SUCCESS_BODY
        )],
        ClientEvent::SuccessOverlayChanged(false) => Vec::new(),
        ClientEvent::AgentStateChanged(state) => {
            vec![format!("(agent {})", presentation::agent_state_text(*state))]
        }
        ClientEvent::MicrophoneChanged(enabled) => {
            vec![format!("(microphone {})", if *enabled { "on" } else { "off" })]
        }
        ClientEvent::Error(message) => vec![format!("error: {message}")],
    }
}
