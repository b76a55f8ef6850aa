use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "streakline-cli", version, about = "Streakline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Record a day's result for a habit
    Log {
        #[command(subcommand)]
        action: commands::log::LogCommand,
    },
    /// Streaks, consistency and trends
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Level, XP and attributes
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Run one engagement cycle (call this periodically)
    Wake(commands::wake::WakeArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STREAKLINE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Log { action } => commands::log::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Wake(args) => commands::wake::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "streakline-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
