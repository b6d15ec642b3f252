use colored::Colorize;
use hitit_server::StartError;
use log::{error, info};
use thiserror::Error;
use tokio::runtime;

mod logging;

#[derive(Debug, Error)]
enum HititError {
    #[error(transparent)]
    Server(#[from] StartError),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl HititError {
    fn hint(&self) -> String {
        match self {
            HititError::Server(e) => e.hint(),
            HititError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn run() -> Result<(), HititError> {
    info!("Building async runtime...");
    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hitit-async")
        .build()
        .map_err(|e| HititError::Fatal(e.to_string()))?;

    runtime.block_on(hitit_server::run_server())?;

    Ok(())
}

fn main() {
    logging::init_logger();

    if let Err(error) = run() {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "hit.it failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
