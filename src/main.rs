use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use rustyline::{error::ReadlineError, DefaultEditor};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use config::Config;
use player::{Player, PlayerCommand, PlayerState, SCAN_INTERVAL};
use radio::KaRadio;

mod config;
mod error;
mod player;
mod radio;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Radio address, overrides the configured one
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Where `setup` keeps what it learned about the radio
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    GenerateCompletions,
    /// Check that the radio answers and remember its stations
    Setup {
        #[arg(value_name = "URL")]
        address: String,
    },
    /// Read version and stations of the configured radio again
    UpdateInfo,
    /// Point the configuration at another address, keeping the stations
    SetUrl {
        #[arg(value_name = "URL")]
        address: String,
    },
    /// Poll the radio and print every change
    Watch {
        #[arg(long, value_name = "SECS", default_value_t = SCAN_INTERVAL.as_secs())]
        interval: u64,
    },
    Shell,
    #[command(flatten)]
    Action(Action),
}

#[derive(Subcommand)]
enum Action {
    Status,
    Info,
    Sources,
    Version,
    Play,
    Start,
    Stop,
    /// Tune to a station by name or number
    #[command(alias("si"))]
    Select {
        #[arg(required = true)]
        source: Vec<String>,
    },
    /// Set the volume, 0.0 to 1.0
    #[command(alias("vol"))]
    Volume {
        #[arg(allow_negative_numbers = true)]
        level: f64,
    },
}

#[derive(Parser)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    action: Action,
}

fn load_player(url: Option<String>, path: &Path) -> Result<Player> {
    let config = match (Config::load(path)?, url) {
        (Some(config), Some(url)) => Config { url, ..config },
        (Some(config), None) => config,
        (None, Some(url)) => Config {
            url,
            ..Config::default()
        },
        (None, None) => return Err(eyre!("no radio configured, run `karadio setup <URL>` first")),
    };
    Ok(config.into_player())
}

fn set_url(path: &Path, address: String) -> Result<Config> {
    let config = Config::load(path)?
        .ok_or_else(|| eyre!("no radio configured, run `karadio setup <URL>` first"))?;
    let config = Config {
        url: address.trim_end_matches('/').to_owned(),
        ..config
    };
    config.save(path)?;
    Ok(config)
}

/// Accepts a station name, or its number when no station has that name.
fn resolve_source(player: &Player, source: &str) -> String {
    let known = player.source_list();
    if known.iter().any(|name| name == source) {
        return source.to_owned();
    }
    source
        .parse::<usize>()
        .ok()
        .and_then(|index| known.get(index))
        .cloned()
        .unwrap_or_else(|| source.to_owned())
}

async fn run(player: &mut Player, action: Action) -> Result<()> {
    match action {
        Action::Status => {
            println!("{}", player.refresh().await);
        }
        Action::Info => {
            let info = player
                .radio()
                .info()
                .await?
                .ok_or_else(|| eyre!("no answer from {}", player.radio().url()))?;
            print!("{info}");
        }
        Action::Sources => {
            for (index, name) in player.radio().source_list().await.iter().enumerate() {
                println!("{index:>3} {name}");
            }
        }
        Action::Version => {
            println!("{}", player.radio().version().await?);
        }
        Action::Play => {
            player.refresh().await;
            player.apply_command(PlayerCommand::Play).await?;
        }
        Action::Start => player.apply_command(PlayerCommand::Start).await?,
        Action::Stop => player.apply_command(PlayerCommand::Stop).await?,
        Action::Select { source } => {
            let source = resolve_source(player, &source.join(" "));
            player.apply_command(PlayerCommand::SelectSource(source)).await?;
        }
        Action::Volume { level } => {
            player.apply_command(PlayerCommand::SetVolume(level)).await?;
        }
    }
    Ok(())
}

/// Polls every `period` and prints the state whenever it changes, until `shutdown`.
async fn watch(
    player: &mut Player,
    period: Duration,
    shutdown: impl Future<Output = io::Result<()>>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    let mut shown: Option<PlayerState> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = tokio::select! {
                    state = player.refresh() => state,
                    result = &mut shutdown => return Ok(result?),
                };
                if shown.as_ref() != Some(state) {
                    println!("{state}");
                    shown = Some(state.clone());
                }
            }
            result = &mut shutdown => return Ok(result?),
        }
    }
}

async fn shell(player: &mut Player) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match tokio::task::block_in_place(|| editor.readline("karadio> ")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;
        if matches!(line, "quit" | "exit") {
            return Ok(());
        }
        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(ShellLine { action }) => {
                if let Err(err) = run(player, action).await {
                    eprintln!("error: {err:#}");
                }
            }
            Err(err) => err.print()?,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("karadio=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        url,
        config,
        command,
    } = Cli::parse();
    let config_path = match config {
        Some(path) => path,
        None => Config::default_path()
            .ok_or_else(|| eyre!("no configuration directory, pass --config"))?,
    };
    match command {
        Command::GenerateCompletions => {
            clap_complete::generate(
                clap_complete::shells::Zsh,
                &mut Cli::command(),
                "karadio",
                &mut std::io::stdout(),
            );
        }
        Command::Setup { address } => {
            let player = Player::setup(KaRadio::new(&address)).await?;
            Config::from_player(&player).save(&config_path)?;
            println!(
                "{} {} with {} stations",
                player.radio().url(),
                player.sw_version().unwrap_or("unknown version"),
                player.source_list().len()
            );
        }
        Command::UpdateInfo => {
            let mut player = load_player(url, &config_path)?;
            player.update_info().await?;
            Config::from_player(&player).save(&config_path)?;
        }
        Command::SetUrl { address } => {
            let config = set_url(&config_path, address)?;
            println!("{}", config.url);
        }
        Command::Watch { interval } => {
            let mut player = load_player(url, &config_path)?;
            let period = Duration::from_secs(interval.max(1));
            watch(&mut player, period, tokio::signal::ctrl_c()).await?;
        }
        Command::Shell => {
            let mut player = load_player(url, &config_path)?;
            shell(&mut player).await?;
        }
        Command::Action(action) => {
            let mut player = load_player(url, &config_path)?;
            run(&mut player, action).await?;
        }
    }
    Ok(())
}
