//! Point d'entrée CLI pour anp-extract

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, GlobalArgs};

/// Extraire les indicateurs climatiques et environnementaux des aires protégées
#[derive(Parser)]
#[command(name = "anp-extract")]
#[command(author, version)]
#[command(about = "Extraction reprenable d'indicateurs climatiques pour les aires protégées")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Extract {
            dataset,
            filter,
            test,
            force,
            skip_existing,
            report,
        } => {
            info!(dataset = %dataset, filter = ?filter, test = ?test, "Extraction");
            cli::cmd_extract(
                &cli.global,
                dataset,
                filter.as_deref(),
                test,
                force,
                skip_existing,
                report.as_deref(),
            )
            .await?;
        }
        Commands::Retry { dataset, report } => {
            info!(dataset = %dataset, "Retry");
            cli::cmd_retry(&cli.global, dataset, report.as_deref()).await?;
        }
        Commands::Status { dataset } => {
            cli::cmd_status(&cli.global, dataset)?;
        }
        Commands::Sample { region, resolution } => {
            cli::cmd_sample(&cli.global, &region, resolution)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
