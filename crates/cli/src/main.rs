use clap::{Parser, Subcommand};
use widget::config::{self, Config};
use widget::events::{InnerEvent, MessageEvent};
use widget::{Bot, Incoming, StopReason};

#[derive(Parser)]
#[command(name = "widget-bot")]
#[command(about = "Widget Slack bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: WIDGET_CONFIG_PATH or ~/.widget/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: check the token, listen for Events API webhooks and answer every
    /// message with a fixed reply. Needs SLACK_XOXB (or slack.botToken).
    Run {
        /// Config file path (default: WIDGET_CONFIG_PATH or ~/.widget/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Reply text (default from responder.replyText)
        #[arg(long, short)]
        reply: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("widget-bot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, reply }) => {
            if let Err(e) = run_bot(config, reply).await {
                log::error!("bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = widget::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_bot(
    config_path: Option<std::path::PathBuf>,
    reply: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    if let Some(text) = reply {
        config.responder.reply_text = text;
    }
    if config::resolve_bot_token(&config).is_none() {
        anyhow::bail!("set SLACK_XOXB to run");
    }

    let (bot, mut events) = Bot::connect(&config).await?;
    log::info!("listening on {}", bot.listen_addr());

    loop {
        tokio::select! {
            incoming = events.recv() => match incoming {
                Some(Incoming::Event(InnerEvent::Message(msg))) => {
                    respond(&bot, &config, &msg).await;
                }
                Some(Incoming::Event(other)) => {
                    log::debug!("ignoring {} event", other.event_type());
                }
                Some(Incoming::Stopped(StopReason::Failed(reason))) => {
                    anyhow::bail!("webhook listener stopped: {}", reason);
                }
                Some(Incoming::Stopped(StopReason::Shutdown)) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, shutting down");
                bot.shutdown();
            }
        }
    }
    Ok(())
}

/// Reply to anyone but ourselves, then log the message with resolved names.
async fn respond(bot: &Bot, config: &Config, msg: &MessageEvent) {
    if let Err(e) = bot.reply_to(msg, &config.responder.reply_text).await {
        log::warn!("reply to {} failed: {}", msg.channel, e);
    }

    let channel = bot.channel_name(&msg.channel).await;
    let author = match (&msg.user, &msg.bot_id) {
        (Some(user), _) => bot.user_name(user).await,
        (None, Some(bot_id)) => bot_id.clone(),
        (None, None) => widget::cache::UNKNOWN_NAME.to_string(),
    };
    log::info!("[{}] <{}> {}", channel, author, msg.text);
}
