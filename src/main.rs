use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lintas_bot::infrastructure::adapters::{ConsoleGateway, TelegramGateway};
use lintas_bot::infrastructure::config::{Config, GatewayKind};
use lintas_bot::plugins::builtin::EventLogPlugin;
use lintas_bot::{BotError, BotHost, BotState, GatewayClient};

/// Token used by the console gateway when none is configured
const CONSOLE_DEV_TOKEN: &str = "console-dev";

#[derive(Parser)]
#[command(name = "lintas-bot")]
#[command(about = "A plugin-driven chat bot host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_bot(&cli.config, cli.token) {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("lintas-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn load_config(config_path: &str) -> Config {
    if !std::path::Path::new(config_path).exists() {
        return Config::load_env();
    }

    match Config::load(config_path) {
        Ok(mut config) => {
            config.apply_env();
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        }
    }
}

fn run_bot(config_path: &str, token_override: Option<String>) -> Result<(), BotError> {
    let config = load_config(config_path);
    tracing::info!("Starting lintas-bot: {}", config.bot.name);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("failed to start runtime: {}", e)))?;
    let shutdown = CancellationToken::new();

    let result = runtime.block_on(serve(config, token_override, shutdown));

    // stdin reads never yield to cancellation, so do not wait on them forever
    runtime.shutdown_timeout(Duration::from_secs(2));
    result
}

async fn serve(config: Config, token_override: Option<String>, shutdown: CancellationToken) -> Result<(), BotError> {
    let (client, token): (Arc<dyn GatewayClient>, Option<String>) = match config.gateway.kind {
        GatewayKind::Telegram => {
            let mut gateway = TelegramGateway::new();
            if let Some(api_base) = &config.gateway.api_base {
                gateway = gateway.with_api_base(api_base.clone());
            }
            (Arc::new(gateway), token_override.or(config.gateway.token.clone()))
        }
        GatewayKind::Console => {
            let token = token_override
                .or(config.gateway.token.clone())
                .unwrap_or_else(|| CONSOLE_DEV_TOKEN.to_string());
            (Arc::new(ConsoleGateway::new()), Some(token))
        }
    };

    let mut builder = BotHost::builder(client)
        .with_command_prefix(config.bot.prefix.clone())
        .with_cancellation(shutdown.clone())
        .with_service(Arc::new(config.clone()));
    if let Some(token) = token {
        builder = builder.with_credentials(token);
    }
    if config.plugins.event_log {
        builder = builder.with_plugin_type::<EventLogPlugin>();
    }
    if config.plugins.enabled {
        if let Some(dir) = &config.plugins.directory {
            builder = builder.with_plugin_directory(dir.clone());
        }
        for library in &config.plugins.libraries {
            builder = builder.with_plugin_library(library.clone());
        }
    }

    let mut host = builder.build();
    if host.state() == BotState::Unconfigured {
        tracing::warn!("No gateway token configured; set BOT_TOKEN or pass --token");
    }

    // ctrl-c during startup aborts the session
    let interrupt = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        })
    };
    let started = host.start_and_wait().await;
    interrupt.abort();
    if let Err(e) = started {
        host.dispose().await;
        return Err(e);
    }
    tracing::info!(
        "Bot running on {} with {} plugins (prefix '{}')",
        config.gateway.kind.as_str(),
        host.catalog().len(),
        host.command_prefix()
    );

    let mut states = host.subscribe_state();
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Shutting down");
            Ok(())
        }
        state = states.wait_for(|s| s.is_terminal()) => match state.map(|s| *s) {
            Ok(BotState::Faulted) => Err(BotError::state("bot session faulted")),
            _ => Ok(()),
        },
    };

    host.dispose().await;
    outcome
}

fn init_config() {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("Failed to render config: {}", e),
    }
}
