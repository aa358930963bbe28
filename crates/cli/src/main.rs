use clap::{Parser, Subcommand};
use relay::allowlist::{AllowlistStore, AuthorizedUser, SqliteAllowlist};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Telegram to OpenAI chat relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the relay: Telegram channel, per-conversation workers and the HTTP gateway.
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Add a Telegram user to the allowlist, optionally pinning their model.
    Allow {
        /// Telegram user id
        user_id: i64,

        /// Model for this user (default: keep the current one, or use the configured default)
        #[arg(long, short, value_name = "MODEL")]
        model: Option<String>,

        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_relay(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Allow {
            user_id,
            model,
            config,
        }) => {
            if let Err(e) = run_allow(config, user_id, model).await {
                log::error!("allow failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_relay(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay with {} on {}:{}",
        path.display(),
        config.gateway.bind,
        config.gateway.port
    );
    relay::gateway::run_gateway(config).await
}

async fn run_allow(
    config_path: Option<std::path::PathBuf>,
    user_id: i64,
    model: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let sqlite_path = relay::config::resolve_sqlite_path(&config);
    let store = SqliteAllowlist::open(&sqlite_path)?;
    let user = match model {
        Some(model) => {
            let user = AuthorizedUser {
                id: user_id,
                model: Some(model),
            };
            store.upsert(user.clone()).await?;
            user
        }
        None => store.ensure(user_id).await?,
    };
    println!(
        "user {} allowed (model: {}) in {}",
        user.id,
        user.model.as_deref().unwrap_or("default"),
        sqlite_path.display()
    );
    Ok(())
}
