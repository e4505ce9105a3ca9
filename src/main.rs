// Feishu Bridge - Main Entry Point
//
// Commands:
// - serve:   run the callback webhook
// - encrypt: build an encrypted callback envelope for testing
// - decrypt: open an envelope captured from Feishu
// - notify:  send a reply message to a Feishu user

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feishu_bridge::config::BridgeConfig;
use feishu_bridge::crypto;
use feishu_bridge::feishu::{FeishuClient, MessageBody};
use feishu_bridge::server;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Feishu Bridge: forward Feishu chat messages to GitHub repository dispatch
#[derive(Parser, Debug)]
#[command(name = "feishu-bridge")]
#[command(author = "Feishu Bridge Contributors")]
#[command(version)]
#[command(about = "Stateless Feishu event webhook bridge", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Encrypt a JSON event into an {"encrypt": ...} envelope
    Encrypt {
        /// Encrypt key (defaults to FEISHU_ENCRYPT_KEY)
        #[arg(long)]
        key: Option<String>,

        /// JSON event to encrypt
        event: String,
    },
    /// Decrypt an envelope blob and print the event
    Decrypt {
        /// Encrypt key (defaults to FEISHU_ENCRYPT_KEY)
        #[arg(long)]
        key: Option<String>,

        /// Base64 value of the `encrypt` field
        blob: String,
    },
    /// Send a message to a Feishu user
    Notify {
        /// Recipient open_id
        open_id: String,

        /// Message text (markdown when --card is set)
        text: String,

        /// Send as an interactive card
        #[arg(long)]
        card: bool,

        /// Card title
        #[arg(long, default_value = "LifeOps")]
        title: String,

        /// Card header colour
        #[arg(long, default_value = "blue")]
        theme: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve { port, bind }) => {
            let config = with_serve_overrides(config, port, bind)?;
            info!("Feishu Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
            server::serve(&config).await?;
        }
        Some(Commands::Encrypt { key, event }) => {
            let key = resolve_key(key, &config)?;
            let event: Value = serde_json::from_str(&event).context("Event is not valid JSON")?;
            let blob = crypto::encrypt(&event, &key)?;
            println!("{}", json!({ "encrypt": blob }));
        }
        Some(Commands::Decrypt { key, blob }) => {
            let key = resolve_key(key, &config)?;
            let event = crypto::decrypt(&blob, &key)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Some(Commands::Notify {
            open_id,
            text,
            card,
            title,
            theme,
        }) => {
            let body = if card {
                MessageBody::Card {
                    title,
                    theme,
                    markdown: text,
                }
            } else {
                MessageBody::Text(text)
            };
            let client = FeishuClient::new(&config.feishu)?;
            let message_id = client.send_message(&open_id, &body).await?;
            info!("Delivered message {:?} to {}", message_id, open_id);
        }
        None => {
            println!("No command specified. Use \"feishu-bridge --help\" for usage.");
        }
    }

    Ok(())
}

/// Initialize tracing from the logging configuration
fn init_logging(config: &BridgeConfig, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { config.log_level()? };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

/// Apply `serve` flags on top of the loaded configuration
fn with_serve_overrides(
    mut config: BridgeConfig,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<BridgeConfig> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.validate().context("Invalid serve options")?;
    Ok(config)
}

fn resolve_key(key: Option<String>, config: &BridgeConfig) -> Result<String> {
    key.or_else(|| config.feishu.encrypt_key.clone())
        .context("No encrypt key: pass --key or set FEISHU_ENCRYPT_KEY")
}
