//! gogu-bot: home-lab control bot
//!
//! `run` connects to Discord; `exec` runs a single command against the
//! local terminal.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use gogu_bot::{BotConfig, BotResult, BotState, IncomingMessage, Replier, handle_message};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often elapsed confirmation windows are swept.
const SWEEP_PERIOD: Duration = Duration::from_secs(5);

/// Identity used for everything typed in `exec` mode.
const LOCAL_USER: &str = "local";

#[derive(Parser)]
#[command(name = "gogu-bot")]
#[command(about = "Home-lab control bot for Discord")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and serve commands
    Run {
        #[command(flatten)]
        config: BotConfig,
    },

    /// Run one command locally and print the replies
    ///
    /// Examples:
    ///   gogu-bot exec status
    ///   gogu-bot exec shutdown_status
    ///   gogu-bot exec shutdown   (then type !confirm_shutdown)
    Exec {
        /// Command name without the prefix (e.g. status, wake, banned)
        command: String,

        #[command(flatten)]
        config: BotConfig,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` must be loaded before clap reads the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Run { config } => run_bot(config).await?,
        Commands::Exec { command, config } => exec_command(&command, config).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("gogu_bot=info".parse()?)
        .add_directive("lab_gate=info".parse()?)
        .add_directive("lab_secrets=info".parse()?)
        .add_directive("lab_health=info".parse()?);

    // stderr keeps `exec` output on stdout clean.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

// ─── Run ─────────────────────────────────────────────────────────────────────

async fn run_bot(config: BotConfig) -> anyhow::Result<()> {
    info!(
        prefix = %config.prefix,
        proxmox = config.proxmox_host.as_deref().unwrap_or("-"),
        vault = config.vault_addr.is_some(),
        cloudflare = config.cf_zone_id.is_some(),
        "starting gogu-bot"
    );

    let token = gogu_bot::resolve_token(&config).await?;

    let state = Arc::new(BotState::new(config)?);
    let sweeper = state.gate.spawn_sweeper(SWEEP_PERIOD);

    let result = gogu_bot::discord::run(Arc::clone(&state), &token).await;
    sweeper.abort();
    result?;
    Ok(())
}

// ─── Exec ────────────────────────────────────────────────────────────────────

struct StdoutReplier;

#[async_trait]
impl Replier for StdoutReplier {
    async fn send(&self, text: &str) -> BotResult<()> {
        println!("{text}");
        Ok(())
    }
}

async fn exec_command(command: &str, config: BotConfig) -> anyhow::Result<()> {
    let content = format!("{}{}", config.prefix, command.trim_start_matches(&config.prefix));
    let state = Arc::new(BotState::new(config)?);

    // Typed lines go to the gate so `shutdown` can be confirmed here. A plain
    // thread, so a blocked read never holds up exit.
    let gate = state.gate.clone();
    std::thread::spawn(move || {
        let initiator = lab_gate::Initiator::new(LOCAL_USER);
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            gate.offer(&initiator, &line);
        }
    });

    let msg = IncomingMessage::new(LOCAL_USER, content);
    handle_message(&state, &msg, &StdoutReplier).await;
    Ok(())
}
