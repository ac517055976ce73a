use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use castaway::cli::commands;
use castaway::config::simulation::SimulationConfig;
use castaway::persistence;

#[derive(Parser)]
#[command(name = "castaway")]
#[command(about = "A deterministic, seeded elimination-game engine for character roleplay seasons")]
#[command(version)]
struct Cli {
    /// Path to the configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "castaway.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a season and save its first snapshot
    New {
        /// Roster TOML; the sample cast is used when omitted
        #[arg(short, long)]
        roster: Option<String>,

        /// Override the roster seed
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Drive a season with the spectator feed
    Run {
        /// Path to a specific season snapshot to load
        #[arg(short, long)]
        snapshot: Option<String>,
    },

    /// Play a whole season headless and print the results
    Simulate {
        #[arg(short, long)]
        roster: Option<String>,

        #[arg(short, long)]
        seed: Option<u64>,

        /// Give up after this many engine ticks
        #[arg(long, default_value_t = 100_000)]
        max_ticks: u64,

        /// Use template narration instead of switching narration off
        #[arg(long)]
        narrate: bool,

        /// Save the finished season as a snapshot
        #[arg(long)]
        save: bool,
    },

    /// Inspect the season or one character
    Inspect {
        #[arg(short, long)]
        snapshot: Option<String>,

        /// Character id to show
        #[arg(long)]
        character: Option<String>,

        /// Number of recent log entries to print
        #[arg(long, default_value_t = 10)]
        log: usize,
    },

    /// Export a season as a versioned JSON document
    Export {
        #[arg(short, long)]
        snapshot: Option<String>,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Import a season document and save it as a snapshot
    Import {
        /// Path to the JSON document
        file: String,
    },

    /// Manage season snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List available snapshots
    List {
        /// Snapshot directory
        #[arg(short, long, default_value = "snapshots")]
        dir: String,
    },

    /// Restore and display a season from a snapshot file
    Restore {
        /// Path to the snapshot file
        file: String,
    },
}

fn load_config(path: &str) -> SimulationConfig {
    let path = Path::new(path);
    let result = if path.exists() {
        SimulationConfig::from_file(path)
    } else {
        SimulationConfig::from_toml_str("", path)
    };
    match result {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn exit_on_error<T>(result: Result<T, String>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}: {}", context, e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_logging(&config.log_level, cli.json_logs);

    match cli.command {
        Commands::New { roster, seed } => {
            let path = exit_on_error(
                commands::new_season(&config, roster.as_deref(), seed),
                "Cannot create season",
            );
            println!("\nSeason saved to {}", path.display());
        }

        Commands::Run { snapshot } => {
            exit_on_error(
                commands::run_season(&config, snapshot.as_deref()).await,
                "Season error",
            );
        }

        Commands::Simulate {
            roster,
            seed,
            max_ticks,
            narrate,
            save,
        } => {
            let season = exit_on_error(
                commands::simulate_season(&config, roster.as_deref(), seed, max_ticks, narrate),
                "Simulation error",
            );
            exit_on_error(commands::print_season_report(&season), "Error");
            if save {
                match persistence::save_snapshot(&season, Path::new(&config.snapshot_directory)) {
                    Ok(path) => println!("\nSeason saved to {}", path.display()),
                    Err(e) => {
                        eprintln!("Cannot save snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }

        Commands::Inspect {
            snapshot,
            character,
            log,
        } => {
            exit_on_error(
                commands::inspect(&config, snapshot.as_deref(), character.as_deref(), log),
                "Error",
            );
        }

        Commands::Export { snapshot, output } => {
            exit_on_error(
                commands::export(&config, snapshot.as_deref(), output.as_deref()),
                "Export error",
            );
        }

        Commands::Import { file } => {
            let path = exit_on_error(commands::import(&config, &file), "Import error");
            println!("Season imported to {}", path.display());
        }

        Commands::Snapshots { action } => match action {
            SnapshotAction::List { dir } => {
                let snapshot_dir = Path::new(&dir);
                match persistence::list_snapshots(snapshot_dir) {
                    Ok(snapshots) => {
                        if snapshots.is_empty() {
                            println!("No snapshots found in {}", snapshot_dir.display());
                        } else {
                            println!("{:<44} {:>8} {:>12}", "File", "Tick", "Size");
                            println!("{}", "-".repeat(66));
                            for s in &snapshots {
                                let name = s
                                    .path
                                    .file_name()
                                    .and_then(|n| n.to_str())
                                    .unwrap_or("?");
                                println!("{:<44} {:>8} {:>9} KB", name, s.tick, s.file_size / 1024);
                            }
                            println!(
                                "\n{} snapshot(s) in {}",
                                snapshots.len(),
                                snapshot_dir.display()
                            );
                        }
                    }
                    Err(e) => {
                        eprintln!("Error listing snapshots: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            SnapshotAction::Restore { file } => {
                let path = Path::new(&file);
                match persistence::load_snapshot(path) {
                    Ok(season) => {
                        println!("Restored season from {}", path.display());
                        commands::print_season_summary(&season);
                    }
                    Err(e) => {
                        eprintln!("Error restoring snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
