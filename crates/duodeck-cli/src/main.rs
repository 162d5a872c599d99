//! Duodeck CLI - headless dual-deck player

mod clock_deck;
mod cli;
mod host;
mod probe;
mod queue;
mod settings;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use cli::Args;
use settings::Settings;


/// Installs the log subscriber. Each `-v` raises the level one step.
fn init_tracing( verbose: u8 ) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level( level )
        .with_target( false )
        .init();
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing( args.verbose );

    let mut settings = Settings::load();
    settings.apply_args( &args );

    if args.save_settings {
        settings.save();
    }

    host::run( args.files, &settings ).await
}
