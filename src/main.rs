use std::{process, sync::Arc};

use clap::Parser;
use log::{error, info};
use tokio::sync::Mutex;

use nextblog_notes::{App, Cli, Config, NoteStorage, Result};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(notes_dir) = cli.notes_dir {
        config.notes_dir = notes_dir;
    }

    let storage = NoteStorage::new(config.clone());
    storage.initialize()?;

    let app = App::new(Arc::new(Mutex::new(storage)), config, cli.verbose);
    app.run(cli.command).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
