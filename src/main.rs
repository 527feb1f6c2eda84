use std::{env, sync::Arc};

use aura_collab::{Collab, DatabaseError, MemoryDatabase, PgDatabase};
use aura_core::Config;
use aura_server::{run_server, StartError};
use colored::{Color, Colorize};
use log::{error, info, warn};
use thiserror::Error;

mod logging;

#[derive(Debug, Error)]
enum AuraError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not start the server: {0}")]
    Server(#[from] StartError),
}

impl AuraError {
    fn hint(&self) -> String {
        match self {
            AuraError::Database(_) => "This is a database error. Make sure AURA_DATABASE_URL points to a running Postgres instance, then try again.".to_string(),
            AuraError::Server(StartError::InvalidPort(_)) => "Set AURA_SERVER_PORT to a number between 1 and 65535, or unset it to use the default.".to_string(),
            AuraError::Server(_) => "The server could not listen. Make sure the port is not already in use.".to_string(),
        }
    }
}

async fn connect(config: Config) -> Result<Collab, AuraError> {
    let Ok(url) = env::var("AURA_DATABASE_URL") else {
        warn!("AURA_DATABASE_URL is not set, parties will only be kept in memory");

        let database = MemoryDatabase::new();

        // Accounts come from the account service, so a development account has to be seeded
        if let Ok(token) = env::var("AURA_DEV_TOKEN") {
            let user = database.insert_user("dev", "Developer");
            database.insert_session(user.id, &token)?;

            info!("Seeded development user {} with the given token", user.username);
        }

        return Ok(Collab::new(config, database));
    };

    info!("Connecting to database...");
    let database = PgDatabase::new(&url).await?;

    Ok(Collab::new(config, database))
}

async fn run() -> Result<(), AuraError> {
    let collab = connect(Config::default()).await?;
    collab.parties.restore().await?;

    info!("Initialized successfully.");
    run_server(Arc::new(collab)).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Logging could not be initialized: {e}");
    }

    if let Err(error) = run().await {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "aura failed to start!".bold().color(Color::Red));
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint())
                .color(Color::BrightBlack)
                .italic()
        );
    }
}
