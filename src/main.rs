use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use plauncher_lib::commands;

#[derive(Parser, Debug)]
#[command(name = "plauncher", author, version, about = "PLauncher - Skakavi Krompir launcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an instance and stay attached until it exits
    Launch {
        /// Executable or script of the instance
        path: PathBuf,
        /// Extra arguments passed before `--data-dir`
        #[arg(last = true)]
        game_args: Vec<String>,
    },
    /// Download the latest release for this platform
    Download {
        /// Target directory (defaults to the launcher downloads directory)
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Show or change an instance's game settings
    Settings {
        /// Executable or script of the instance
        path: PathBuf,
        /// Settings to write, as `key=value`
        #[arg(value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Manage mod files
    Mods {
        #[command(subcommand)]
        action: ModAction,
    },
}

#[derive(Subcommand, Debug)]
enum ModAction {
    List {
        dir: PathBuf,
    },
    Toggle {
        dir: PathBuf,
        name: String,
    },
    Add {
        dir: PathBuf,
        source: PathBuf,
    },
    Remove {
        dir: PathBuf,
        name: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    plauncher_lib::init_tracing();
    tracing::info!("PLauncher starting...");

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Launch { path, game_args } => commands::launch_instance(path, game_args)
            .await
            .map(|code| code.clamp(0, 255) as u8),
        Commands::Download { dest } => commands::download_latest(dest).await.map(|_| 0),
        Commands::Settings { path, set } => commands::game_settings(path, set).await.map(|_| 0),
        Commands::Mods { action } => match action {
            ModAction::List { dir } => commands::list_mods(&dir).map(|_| 0),
            ModAction::Toggle { dir, name } => commands::toggle_mod(&dir, &name).map(|_| 0),
            ModAction::Add { dir, source } => commands::add_mod(&dir, &source).map(|_| 0),
            ModAction::Remove { dir, name, yes } => {
                commands::remove_mod(&dir, &name, yes).map(|_| 0)
            }
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
