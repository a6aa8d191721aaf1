mod app_runtime;
mod catalog;
mod collection_store;
mod config;
mod credentials;
mod enrichment;
mod normalizer;
mod recommendation;
mod records;
mod summary;
mod year_overrides;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use crate::app_runtime::{AppError, AppRuntime};
use crate::credentials::CredentialKind;

/// Recommends records from a personal vinyl collection.
#[derive(Debug, Parser)]
#[command(name = "vinyl_recommender", version, about)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a user's collection from the catalog.
    Fetch {
        username: String,
        #[arg(long)]
        token: Option<String>,
        /// Download again even if a local copy exists.
        #[arg(long)]
        refresh: bool,
        /// Enrich the downloaded collection right away.
        #[arg(long)]
        enrich: bool,
    },
    /// Add original years, ratings, tracklists, and cover images to a collection file.
    Enrich {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the collection summary sent along with recommendation requests.
    Summary {
        #[arg(long)]
        collection: Option<PathBuf>,
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Ask for three records that fit a mood.
    Recommend {
        #[arg(long)]
        mood: String,
        #[arg(long, default_value = "")]
        interests: String,
        #[arg(long)]
        collection: Option<PathBuf>,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Delete every collection file in the data directory.
    Clear,
    /// Save a credential in the OS keyring.
    StoreCredential {
        #[arg(value_enum)]
        kind: CredentialKind,
        secret: String,
    },
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config_file = match cli.config {
        Some(path) => path,
        None => config::default_config_file()?,
    };
    let runtime = AppRuntime::new(config::load_or_create(&config_file)?);

    match cli.command {
        Command::Fetch {
            username,
            token,
            refresh,
            enrich,
        } => {
            let outcome = runtime.fetch_collection(&username, token, refresh, enrich)?;
            println!(
                "{} records {} {}",
                outcome.records,
                if outcome.reused { "already in" } else { "saved to" },
                outcome.path.display()
            );
        }
        Command::Enrich {
            input,
            output,
            token,
        } => {
            let (path, report) = runtime.enrich_file(input, output, token)?;
            println!("{}", report.summary_line());
            println!("Saved to {}", path.display());
        }
        Command::Summary {
            collection,
            max_items,
        } => {
            println!("{}", runtime.summary(collection.as_deref(), max_items)?);
        }
        Command::Recommend {
            mood,
            interests,
            collection,
            api_key,
        } => {
            println!(
                "{}",
                runtime.recommend(collection.as_deref(), &mood, &interests, api_key)
            );
        }
        Command::Clear => {
            let removed = runtime.clear_data()?;
            println!("Removed {removed} collection files");
        }
        Command::StoreCredential { kind, secret } => {
            runtime.store_credential(kind, &secret)?;
            println!("Stored {kind:?} credential");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    match run(cli) {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
