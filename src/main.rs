mod cli;
mod config;
mod daemon;
mod db;
mod ipc;
mod list;
mod models;
mod result;
mod status;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, Cli, Commands, DaemonCommands, NewEntry};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::new(cli.data_dir)?;

    match cli.command {
        Commands::Add {
            url,
            title,
            artist,
            album,
            duration,
        } => {
            app.add(NewEntry {
                url: &url,
                title: &title,
                artist: artist.as_deref(),
                album: album.as_deref(),
                duration: &duration,
            })?;
        }
        Commands::List => {
            app.list()?;
        }
        Commands::Select { query } => {
            app.select(&query)?;
        }
        Commands::Column { query } => {
            app.column(&query)?;
        }
        Commands::Keys { query } => {
            app.keys(&query)?;
        }
        Commands::Show { id } => {
            app.show(id)?;
        }
        Commands::Status => {
            app.status()?;
        }
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                app.daemon_start()?;
            }
            DaemonCommands::Stop => {
                app.daemon_stop()?;
            }
            DaemonCommands::Status => {
                app.daemon_status()?;
            }
            DaemonCommands::Run => {
                app.daemon_run()?;
            }
        },
    }

    Ok(())
}
