//! FotoTochka CLI
//!
//! Command-line interface for the FotoTochka FAQ bot

mod health;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fototochka_config::Config;
use fototochka_core::{load_knowledge, BotRuntime, Resolution};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fototochka")]
#[command(about = "FAQ chat bot for the FotoTochka photo studio", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (overrides core.log_level)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram poller, the answer runtime and the health-check server
    Start,

    /// Validate the config file and the knowledge base
    Check,

    /// Answer one message offline, as a first-time user would see it
    Ask {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List log files and their total size
    Logs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = load_config(cli.config.as_deref())?;
            let log_dir = config.data_dir().join("logs");
            let _logging_guard =
                logging::init_logging(&log_dir, &log_level(cli.log_level.as_deref(), &config))?;

            let runtime = BotRuntime::new(config.clone())?;

            if config.health.enabled {
                let health_config = config.health.clone();
                tokio::spawn(async move {
                    if let Err(e) = health::serve(&health_config).await {
                        error!("Health-check server failed: {}", e);
                    }
                });
            }

            info!("Starting FotoTochka bot in foreground...");
            tokio::select! {
                result = runtime.run() => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            }
        }

        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            logging::init_stderr_logging(&log_level(cli.log_level.as_deref(), &config));
            let knowledge = load_knowledge(&config)?;
            let entries = knowledge.len();
            BotRuntime::with_knowledge(config, knowledge)?;
            println!("Configuration is valid ({} knowledge base entries).", entries);
        }

        Commands::Ask { text } => {
            let config = read_config_or_default(cli.config.as_deref())?;
            logging::init_stderr_logging(cli.log_level.as_deref().unwrap_or("warn"));

            let text = text.join(" ");
            let text = text.trim();
            if text.is_empty() {
                anyhow::bail!("message text cannot be empty");
            }

            let mut runtime = BotRuntime::new(config)?;
            let (payload, resolution) = runtime.handle_turn(0, text);

            println!("{}", payload.text);
            if let Some(keyboard) = payload.keyboard {
                println!();
                for row in keyboard.layout() {
                    let labels: Vec<&str> = row.iter().map(|button| button.label).collect();
                    println!("[ {} ]", labels.join(" | "));
                }
            }
            eprintln!("({})", describe_resolution(&resolution));
        }

        Commands::Init { force } => {
            let path = config_path(cli.config.as_deref())?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, Config::template())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Config written to {}", path.display());
            println!(
                "Set telegram.bot_token or export {} before `fototochka start`.",
                fototochka_config::ENV_BOT_TOKEN
            );
        }

        Commands::Logs => {
            let config = read_config_or_default(cli.config.as_deref())?;
            let manager = logging::LogManager::new(config.data_dir().join("logs"));
            let files = manager.log_files()?;
            if files.is_empty() {
                println!("No log files yet.");
                return Ok(());
            }
            println!(
                "Log files ({} total):\n",
                logging::LogManager::format_size(manager.total_size()?)
            );
            for file in files {
                let metadata = fs::metadata(&file)?;
                let modified: chrono::DateTime<chrono::Local> = metadata.modified()?.into();
                println!(
                    "  {} ({}, modified {})",
                    file.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    logging::LogManager::format_size(metadata.len()),
                    modified.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    Ok(())
}

fn config_path(path_arg: Option<&str>) -> Result<PathBuf> {
    match path_arg {
        Some(path) => Ok(fototochka_config::expand_user_path(path)),
        None => Config::default_path().context("No config directory available on this system"),
    }
}

fn load_config(path_arg: Option<&str>) -> Result<Config> {
    load_config_from(path_arg, Config::default_path(), |key| std::env::var(key).ok())
}

/// An explicit `--config` must exist. Without one, a missing default file
/// leaves the environment as the only source.
fn load_config_from<F>(
    path_arg: Option<&str>,
    default_path: Option<PathBuf>,
    lookup: F,
) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let path = match path_arg {
        Some(path) => {
            let path = fototochka_config::expand_user_path(path);
            if !path.exists() {
                anyhow::bail!("No config file found at {}", path.display());
            }
            path
        }
        None => match default_path {
            Some(path) if path.exists() => path,
            _ => {
                return Config::from_env(lookup).with_context(|| {
                    format!(
                        "No config file found; export {} or run `fototochka init`",
                        fototochka_config::ENV_BOT_TOKEN
                    )
                })
            }
        },
    };
    Config::load(&path).with_context(|| format!("loading config from {}", path.display()))
}

/// Like `load_config` but tolerates a missing file and skips validation.
fn read_config_or_default(path_arg: Option<&str>) -> Result<Config> {
    let path = config_path(path_arg)?;
    if path.exists() {
        Config::read(&path).with_context(|| format!("reading config from {}", path.display()))
    } else {
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }
}

fn log_level(cli_level: Option<&str>, config: &Config) -> String {
    cli_level
        .or(config.core.log_level.as_deref())
        .unwrap_or("info")
        .to_string()
}

fn describe_resolution(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Repeated => "repeated question".to_string(),
        Resolution::Greeting => "first-contact greeting".to_string(),
        Resolution::Matched(hit) => format!("topic '{}' via {:?}", hit.topic, hit.rule),
    }
}
