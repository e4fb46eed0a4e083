use log::{error, info};
use rocket::Error as RocketError;
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Rocket(#[from] RocketError),
}

async fn run() -> Result<(), Error> {
    info!("Configuring tally service...");
    let rocket = vn_election::ctf_rocket().ignite().await?;
    let candidates = rocket
        .state::<std::sync::Arc<vn_election::model::tally::TallyService>>()
        .map(|tally| tally.candidates().join(", "))
        .unwrap_or_default();
    info!("...tally service configured, candidates: {candidates}");
    let _ = rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    log4rs::init_file(vn_election::logging::CTF_LOG_CONFIG, Default::default())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
