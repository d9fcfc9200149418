//! Quest command line
//!
//! Drives the collection from the terminal: list buckets, track games, move
//! them between statuses, reorder the backlog and annotate finished games.
//! Each invocation loads the collection, applies one change and waits for
//! it to be persisted.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use quest_config::QuestConfig;
use quest_library::{
    CatalogMetadata, CollectionSyncController, GameDetails, GameStatus, Platform, SqliteGateway,
    SyncHandle, SyncOutcome, TrackedGame,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "quest", version, about = "Track your game backlog")]
struct Cli {
    /// Configuration file (defaults to ~/.quest/config.toml, then /etc/quest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tracked games, one bucket or all of them
    List {
        #[arg(long)]
        status: Option<GameStatus>,
    },
    /// Print one game as JSON
    Show { id: i64 },
    /// Start tracking a game from the metadata catalogue
    Add {
        id: i64,
        #[arg(long, default_value = "backlog")]
        status: GameStatus,
    },
    /// Move a game to another status
    Move { id: i64, status: GameStatus },
    /// Move a backlog entry from one rank to another (1-based)
    Reorder { from: usize, to: usize },
    /// Stop tracking a game
    Remove { id: i64 },
    /// Set rating, notes and completion date
    Rate {
        id: i64,
        #[arg(long)]
        rating: Option<u8>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        completed_on: Option<String>,
    },
    /// Choose the platform a game is played on (0 clears it)
    Platform { id: i64, platform: i64 },
}

/// Setup logging to stderr
fn setup_logging(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<QuestConfig> {
    let mut config = match &cli.config {
        Some(path) => QuestConfig::load_layered(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => QuestConfig::load_default().context("Failed to load configuration")?,
    };
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    Ok(config)
}

fn load_catalog(config: &QuestConfig) -> Result<CatalogMetadata> {
    match &config.metadata.catalog_path {
        Some(path) => CatalogMetadata::from_json_file(path)
            .with_context(|| format!("Failed to read metadata catalogue {}", path.display())),
        None => {
            warn!("No metadata catalogue configured; new games cannot be added");
            Ok(CatalogMetadata::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    setup_logging(&config.logging.filter);

    let database_dir = config.database.path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = database_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let gateway = SqliteGateway::open(&config.database.path)
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    let catalog = load_catalog(&config)?;

    let controller =
        CollectionSyncController::new(Arc::new(gateway), Arc::new(catalog), &config.sync)?;
    controller.load_all().await?;

    run(&controller, cli.command).await
}

async fn run(controller: &CollectionSyncController, command: Command) -> Result<()> {
    match command {
        Command::List { status } => {
            let statuses = match status {
                Some(status) => vec![status],
                None => GameStatus::ALL
                    .into_iter()
                    .filter(|status| *status != GameStatus::Undiscovered)
                    .collect(),
            };
            for status in statuses {
                print_bucket(status, &controller.snapshot(status));
            }
            Ok(())
        }
        Command::Show { id } => {
            let (_, game) = controller
                .find(id)
                .with_context(|| format!("Game {} is not in the collection", id))?;
            println!("{}", serde_json::to_string_pretty(&game)?);
            Ok(())
        }
        Command::Add { id, status } => {
            let handle = controller.add_game(id, status).await?;
            settle(handle).await?;
            info!("Tracking game {} as {}", id, status);
            Ok(())
        }
        Command::Move { id, status } => {
            let current = current_status(controller, id)?;
            settle(controller.change_status(id, status, current)?).await
        }
        Command::Reorder { from, to } => {
            if from == 0 || to == 0 {
                bail!("Ranks start at 1");
            }
            settle(controller.reorder(GameStatus::Backlog, from - 1, to - 1)?).await?;
            print_bucket(GameStatus::Backlog, &controller.snapshot(GameStatus::Backlog));
            Ok(())
        }
        Command::Remove { id } => {
            let current = current_status(controller, id)?;
            settle(controller.remove(id, current)?).await
        }
        Command::Rate {
            id,
            rating,
            notes,
            completed_on,
        } => {
            let details = GameDetails {
                personal_rating: rating,
                notes,
                completion_date: completed_on,
            };
            settle(controller.update_details(id, details)?).await
        }
        Command::Platform { id, platform } => {
            let platform = if platform == 0 {
                Platform::unselected()
            } else {
                Platform::new(platform, "")
            };
            settle(controller.select_platform(id, platform)?).await
        }
    }
}

fn current_status(controller: &CollectionSyncController, id: i64) -> Result<GameStatus> {
    controller
        .status_of(id)
        .with_context(|| format!("Game {} is not in the collection", id))
}

async fn settle(handle: SyncHandle) -> Result<()> {
    let kind = handle.kind();
    match handle.settled().await {
        SyncOutcome::Confirmed => Ok(()),
        SyncOutcome::Discarded => bail!("{} was discarded after a failed save", kind),
        SyncOutcome::Reconciled { cause } => {
            bail!("{} could not be saved and was reverted: {}", kind, cause)
        }
        SyncOutcome::Unreconciled { cause } => bail!("{} could not be saved: {}", kind, cause),
    }
}

fn print_bucket(status: GameStatus, games: &[TrackedGame]) {
    println!("{} ({})", status, games.len());
    for game in games {
        let rank = game
            .priority
            .map(|priority| format!("{:>3}.", priority))
            .unwrap_or_else(|| "   -".to_string());
        let platform = if game.selected_platform.is_unselected() {
            String::new()
        } else {
            format!(" [{}]", game.selected_platform.name)
        };
        let rating = game
            .personal_rating
            .map(|rating| format!(" {}/10", rating))
            .unwrap_or_default();
        println!("{} {:>8}  {}{}{}", rank, game.id, game.name, platform, rating);
    }
}
