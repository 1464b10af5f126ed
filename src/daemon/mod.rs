use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::ipc::{DaemonClient, DaemonCommand, DaemonResponse};
use crate::models::{DaemonStatus, Value, ValueKind};
use crate::result::ResultPayload;

/// Bookkeeping shared by every request the daemon serves.
struct ServeState {
    db: Database,
    started: Instant,
    queries_served: u64,
    running: bool,
}

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn run(&self) -> Result<()> {
        use interprocess::local_socket::prelude::*;
        use interprocess::local_socket::{GenericFilePath, ListenerOptions};

        let socket_path = self.config.socket_path();

        // Remove stale socket
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let db = Database::open(&self.config.db_path()).with_context(|| "Failed to open database")?;

        let name = socket_path.as_os_str().to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .with_context(|| "Failed to create socket listener")?;

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string())?;

        info!("Daemon started, listening on {}", socket_path.display());

        let mut state = ServeState {
            db,
            started: Instant::now(),
            queries_served: 0,
            running: true,
        };

        while state.running {
            match listener.accept() {
                Ok(conn) => {
                    if let Err(e) = handle_connection(conn, &mut state) {
                        error!("Connection error: {e}");
                    }
                }
                Err(e) => {
                    if state.running {
                        error!("Accept error: {e}");
                    }
                }
            }
        }

        // Cleanup
        let _ = fs::remove_file(&socket_path);
        let _ = fs::remove_file(&pid_path);

        info!(
            "Daemon stopped after serving {} queries",
            state.queries_served
        );
        Ok(())
    }

    pub fn start_detached(config: &Config) -> Result<()> {
        use std::process::Command;

        let socket_path = config.socket_path();
        if socket_path.exists() {
            if Self::is_running(config) {
                anyhow::bail!("Daemon is already running");
            }
            fs::remove_file(&socket_path)?;
        }

        let exe = std::env::current_exe()?;

        let mut command = Command::new(&exe);
        command
            .arg("--data-dir")
            .arg(config.data_dir())
            .arg("daemon")
            .arg("run")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().with_context(|| "Failed to start daemon")?;

        for _ in 0..50 {
            if socket_path.exists() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }

        anyhow::bail!("Daemon failed to start")
    }

    pub fn stop(config: &Config) -> Result<()> {
        let client = client_for(config);
        if client.is_daemon_running() {
            client.shutdown()?;
            for _ in 0..50 {
                if !config.socket_path().exists() {
                    return Ok(());
                }
                thread::sleep(Duration::from_millis(100));
            }
            warn!("Daemon did not remove its socket after shutdown");
        }
        Ok(())
    }

    pub fn is_running(config: &Config) -> bool {
        client_for(config).is_daemon_running()
    }
}

fn client_for(config: &Config) -> DaemonClient {
    DaemonClient::new(config.socket_path(), config.client.name.clone())
}

fn handle_connection(conn: interprocess::local_socket::Stream, state: &mut ServeState) -> Result<()> {
    let mut reader = BufReader::new(&conn);
    let mut writer = &conn;

    let mut line = String::new();
    reader.read_line(&mut line)?;

    let command: DaemonCommand = serde_json::from_str(&line)?;
    let response = handle_command(command, state);

    let response_json = serde_json::to_string(&response)?;
    writeln!(writer, "{response_json}")?;
    writer.flush()?;

    Ok(())
}

fn handle_command(command: DaemonCommand, state: &mut ServeState) -> DaemonResponse {
    match command {
        DaemonCommand::Select { query } => {
            state.queries_served += 1;
            match state.db.select(&query) {
                Ok(rows) => DaemonResponse::Result(ResultPayload::new(
                    ValueKind::Dict,
                    rows.into_iter().map(Value::Dict).collect(),
                )),
                Err(e) => {
                    warn!("Select failed: {e:#}");
                    DaemonResponse::Error(format!("{e:#}"))
                }
            }
        }
        DaemonCommand::Column { query } => {
            state.queries_served += 1;
            match state.db.select_column(&query).and_then(column_payload) {
                Ok(payload) => DaemonResponse::Result(payload),
                Err(e) => {
                    warn!("Column query failed: {e:#}");
                    DaemonResponse::Error(format!("{e:#}"))
                }
            }
        }
        DaemonCommand::GetStatus => match state.db.get_entry_count() {
            Ok(entries) => DaemonResponse::Status(DaemonStatus {
                entries,
                queries_served: state.queries_served,
                uptime_secs: state.started.elapsed().as_secs(),
            }),
            Err(e) => DaemonResponse::Error(format!("{e:#}")),
        },
        DaemonCommand::Shutdown => {
            state.running = false;
            DaemonResponse::Ok
        }
    }
}

/// The list kind follows the first value; every other value must agree.
fn column_payload(values: Vec<Value>) -> Result<ResultPayload> {
    let Some(kind) = values.first().map(Value::kind) else {
        return Ok(ResultPayload::empty());
    };

    if let Some(other) = values.iter().find(|v| v.kind() != kind) {
        anyhow::bail!(
            "Mixed value kinds in column: expected {kind}, found {}",
            other.kind()
        );
    }

    Ok(ResultPayload::new(kind, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::List;
    use crate::models::{Dict, MediaEntry};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.path = dir.path().to_path_buf();
        config
    }

    fn wait_for_socket(config: &Config) {
        for _ in 0..50 {
            if config.socket_path().exists() {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("daemon never created {}", config.socket_path().display());
    }

    fn state() -> ServeState {
        let db = Database::open_in_memory().unwrap();
        let mut a = MediaEntry::new("file:///a.ogg".into(), "Alpha".into(), 185);
        a.artist = Some("Band".to_string());
        db.insert_entry(&a).unwrap();
        db.insert_entry(&MediaEntry::new("file:///b.ogg".into(), "Beta".into(), 240))
            .unwrap();

        ServeState {
            db,
            started: Instant::now(),
            queries_served: 0,
            running: true,
        }
    }

    fn payload(response: DaemonResponse) -> ResultPayload {
        match response {
            DaemonResponse::Result(payload) => payload,
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_select_yields_dict_list() {
        let mut state = state();
        let response = handle_command(
            DaemonCommand::Select {
                query: "SELECT title FROM media ORDER BY id".to_string(),
            },
            &mut state,
        );

        let handle = payload(response).into_handle();
        let titles: Vec<String> = List::<Dict>::new(&handle)
            .unwrap()
            .map(|d| d.unwrap().get_str("title").unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
        assert_eq!(state.queries_served, 1);
    }

    #[test]
    fn test_select_error_is_reported() {
        let mut state = state();
        let response = handle_command(
            DaemonCommand::Select {
                query: "UPDATE media SET title = 'x'".to_string(),
            },
            &mut state,
        );
        assert!(matches!(response, DaemonResponse::Error(e) if e.contains("read-only")));
    }

    #[test]
    fn test_column_kinds() {
        let mut state = state();

        let ids = payload(handle_command(
            DaemonCommand::Column {
                query: "SELECT id FROM media ORDER BY id".to_string(),
            },
            &mut state,
        ));
        assert_eq!(ids.kind, ValueKind::Int32);
        let ids: Vec<i32> = List::<i32>::new(&ids.into_handle())
            .unwrap()
            .collect::<Result<Vec<i32>, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let empty = payload(handle_command(
            DaemonCommand::Column {
                query: "SELECT title FROM media WHERE id > 100".to_string(),
            },
            &mut state,
        ));
        assert_eq!(empty.kind, ValueKind::None);
    }

    #[test]
    fn test_mixed_column_rejected() {
        let values = vec![Value::Int32(1), Value::String("two".to_string())];
        let err = column_payload(values).unwrap_err();
        assert!(err.to_string().contains("expected int32, found string"));
    }

    #[test]
    fn test_status_and_shutdown() {
        let mut state = state();

        match handle_command(DaemonCommand::GetStatus, &mut state) {
            DaemonResponse::Status(status) => {
                assert_eq!(status.entries, 2);
                assert_eq!(status.queries_served, 0);
            }
            other => panic!("expected status, got {other:?}"),
        }

        assert!(matches!(
            handle_command(DaemonCommand::Shutdown, &mut state),
            DaemonResponse::Ok
        ));
        assert!(!state.running);
    }

    #[test]
    fn test_socket_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let db = Database::open(&config.db_path()).unwrap();
        let mut a = MediaEntry::new("file:///a.ogg".into(), "Alpha".into(), 185);
        a.artist = Some("Band".to_string());
        db.insert_entry(&a).unwrap();
        drop(db);

        let daemon = Daemon::new(config.clone()).unwrap();
        let server = thread::spawn(move || daemon.run());
        wait_for_socket(&config);

        assert!(Daemon::is_running(&config));
        assert!(config.pid_path().exists());

        let handle = client_for(&config)
            .medialib_select("SELECT title FROM media")
            .wait()
            .unwrap();
        let mut rows = List::<Dict>::new(&handle).unwrap();
        assert!(rows.is_valid());
        assert_eq!(rows.get().unwrap().get_str("title"), Some("Alpha"));
        rows.advance();
        assert!(!rows.is_valid());

        Daemon::stop(&config).unwrap();
        server.join().unwrap().unwrap();

        assert!(!config.socket_path().exists());
        assert!(!config.pid_path().exists());
    }

    #[test]
    fn test_failed_start_leaves_no_pid_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir(config.db_path()).unwrap();

        let daemon = Daemon::new(config.clone()).unwrap();
        assert!(daemon.run().is_err());
        assert!(!config.pid_path().exists());
        assert!(!config.socket_path().exists());
    }
}
