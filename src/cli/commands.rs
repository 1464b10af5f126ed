use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::daemon::Daemon;
use crate::db::Database;
use crate::ipc::DaemonClient;
use crate::list::{List, ListElement};
use crate::models::{DaemonStatus, Dict, MediaEntry, ValueKind};
use crate::result::{PendingResult, ResultHandle};
use crate::status::{StatusLine, format_time};

pub struct App {
    pub config: Config,
    pub db: Database,
}

/// Fields of a new library entry as given on the command line.
pub struct NewEntry<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
    pub duration: &'a str,
}

impl App {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::load()?;
        if let Some(path) = data_dir {
            config.storage.path = path;
        }
        config.ensure_dirs()?;

        let db = Database::open(&config.db_path()).with_context(|| "Failed to open database")?;

        Ok(Self { config, db })
    }

    fn client(&self) -> DaemonClient {
        DaemonClient::new(self.config.socket_path(), self.config.client.name.clone())
    }

    fn ensure_daemon(&self) -> Result<DaemonClient> {
        let client = self.client();
        if !client.is_daemon_running() {
            if self.config.daemon.auto_start {
                eprintln!("Starting daemon...");
                Daemon::start_detached(&self.config)?;
            } else {
                bail!("Daemon is not running. Start it with: tunelib daemon start");
            }
        }
        Ok(client)
    }

    fn query(&self, query: &str) -> Result<ResultHandle> {
        let client = self.ensure_daemon()?;
        wait_logged(client.medialib_select(query), query)
    }

    // Command implementations

    pub fn add(&self, new: NewEntry<'_>) -> Result<()> {
        if let Some(existing) = self.db.get_entry_by_url(new.url)? {
            println!(
                "Already in library as #{}: {}",
                existing.id,
                existing.display_name()
            );
            return Ok(());
        }

        let duration = parse_time(new.duration)?;
        let duration = u32::try_from(duration).context("Duration too long")?;

        let mut entry = MediaEntry::new(new.url.to_string(), new.title.to_string(), duration);
        entry.artist = new.artist.map(String::from);
        entry.album = new.album.map(String::from);

        let id = self.db.insert_entry(&entry)?;
        println!(
            "Added #{id}: {} ({})",
            entry.display_name(),
            format_time(u64::from(entry.duration))
        );

        Ok(())
    }

    pub fn list(&self) -> Result<()> {
        let entries = self.db.get_all_entries()?;

        if entries.is_empty() {
            println!("Library is empty.");
            return Ok(());
        }

        println!("{} entries:\n", entries.len());
        for entry in &entries {
            let album = entry
                .album
                .as_ref()
                .map(|a| format!(" [{a}]"))
                .unwrap_or_default();
            println!(
                "{:4}. {}{} - {}",
                entry.id,
                entry.display_name(),
                album,
                format_time(u64::from(entry.duration))
            );
        }

        Ok(())
    }

    pub fn select(&self, query: &str) -> Result<()> {
        let handle = self.query(query)?;
        if handle.is_empty() {
            println!("No rows.");
            return Ok(());
        }

        let mut rows = List::<Dict>::new(&handle)?;
        println!("{} rows:\n", rows.handle().len());
        while rows.is_valid() {
            let n = rows.position() + 1;
            println!("{n:4}. {}", rows.get()?);
            rows.advance();
        }

        Ok(())
    }

    pub fn column(&self, query: &str) -> Result<()> {
        let client = self.ensure_daemon()?;
        let handle = wait_logged(client.medialib_column(query), query)?;

        match handle.kind() {
            ValueKind::Int32 => print_list::<i32>(&handle),
            ValueKind::Uint32 => print_list::<u32>(&handle),
            ValueKind::String => print_list::<String>(&handle),
            ValueKind::Dict => print_list::<Dict>(&handle),
            ValueKind::None => {
                println!("No values.");
                Ok(())
            }
        }
    }

    pub fn keys(&self, query: &str) -> Result<()> {
        let handle = self.query(query)?;

        let mut keys = BTreeSet::new();
        for row in List::<Dict>::new(&handle)? {
            keys.extend(row?.keys().map(String::from));
        }

        if keys.is_empty() {
            println!("No keys.");
        }
        for key in keys {
            println!("{key}");
        }

        Ok(())
    }

    pub fn show(&self, id: u32) -> Result<()> {
        let Some(entry) = self.db.get_entry(id)? else {
            bail!("No entry with id {id}");
        };

        let mut line = StatusLine::default();
        line.set_text(entry.display_name());
        line.set_total(u64::from(entry.duration));
        println!("{}", line.render(self.config.display.width));

        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        let client = self.client();

        if !client.is_daemon_running() {
            println!("Daemon is not running.");
            return Ok(());
        }

        let status = client.get_status()?;
        print_status(&status);

        Ok(())
    }

    pub fn daemon_start(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is already running.");
            return Ok(());
        }

        Daemon::start_detached(&self.config)?;
        println!("Daemon started.");

        Ok(())
    }

    pub fn daemon_stop(&self) -> Result<()> {
        if !Daemon::is_running(&self.config) {
            println!("Daemon is not running.");
            return Ok(());
        }

        Daemon::stop(&self.config)?;
        println!("Daemon stopped.");

        Ok(())
    }

    pub fn daemon_status(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is running.");
        } else {
            println!("Daemon is not running.");
        }

        Ok(())
    }

    pub fn daemon_run(&self) -> Result<()> {
        let daemon = Daemon::new(self.config.clone())?;
        daemon.run()
    }
}

/// Wait for `pending`, logging its outcome through a completion notifier.
fn wait_logged(pending: PendingResult, query: &str) -> Result<ResultHandle> {
    let started = Instant::now();
    let query = query.to_string();
    pending.connect(move |outcome| match outcome {
        Ok(handle) => info!(
            "Query returned {} items in {:?}: {query}",
            handle.len(),
            started.elapsed()
        ),
        Err(e) => warn!("Query failed after {:?}: {e}", started.elapsed()),
    });
    pending.wait()
}

fn print_list<T: ListElement + Display>(handle: &ResultHandle) -> Result<()> {
    for (i, value) in List::<T>::new(handle)?.enumerate() {
        println!("{:4}. {}", i + 1, value?);
    }
    Ok(())
}

fn parse_time(s: &str) -> Result<u64> {
    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() == 2 {
            let mins: u64 = parts[0].parse().context("Invalid minutes")?;
            let secs: u64 = parts[1].parse().context("Invalid seconds")?;
            return mins
                .checked_mul(60)
                .and_then(|m| m.checked_add(secs))
                .context("Duration too long");
        }
    }

    s.parse()
        .context("Invalid time format. Use seconds or MM:SS")
}

fn print_status(status: &DaemonStatus) {
    println!("Entries: {}", status.entries);
    println!("Queries served: {}", status.queries_served);
    println!("Uptime: {}", format_time(status.uptime_secs));
}
