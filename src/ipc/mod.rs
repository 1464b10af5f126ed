use anyhow::{Context, Result};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::DaemonStatus;
use crate::result::{PendingResult, ResultPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonCommand {
    /// Rows of a medialib query, one dict per row.
    Select { query: String },
    /// First column of a medialib query as a scalar list.
    Column { query: String },
    GetStatus,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    Ok,
    Result(ResultPayload),
    Status(DaemonStatus),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    name: String,
}

impl DaemonClient {
    pub fn new(socket_path: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            name: name.into(),
        }
    }

    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists() && self.send_command(DaemonCommand::GetStatus).is_ok()
    }

    pub fn send_command(&self, command: DaemonCommand) -> Result<DaemonResponse> {
        use interprocess::local_socket::GenericFilePath;
        use interprocess::local_socket::prelude::*;

        let path = self.socket_path.as_os_str();
        let name = path
            .to_fs_name::<GenericFilePath>()
            .with_context(|| "Invalid socket path")?;

        let conn = interprocess::local_socket::Stream::connect(name).with_context(|| {
            format!(
                "Failed to connect to daemon at {}",
                self.socket_path.display()
            )
        })?;

        let mut writer = conn;
        let mut reader = BufReader::new(writer.try_clone()?);

        debug!("[{}] sending {command:?}", self.name);

        // Send command
        let msg = serde_json::to_string(&command)?;
        writeln!(writer, "{msg}")?;
        writer.flush()?;

        // Read response
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: DaemonResponse = serde_json::from_str(&response_line)
            .with_context(|| "Failed to parse daemon response")?;

        Ok(response)
    }

    /// Submit a medialib query. The returned result completes when the
    /// daemon has answered.
    pub fn medialib_select(&self, query: &str) -> PendingResult {
        self.submit(DaemonCommand::Select {
            query: query.to_string(),
        })
    }

    pub fn medialib_column(&self, query: &str) -> PendingResult {
        self.submit(DaemonCommand::Column {
            query: query.to_string(),
        })
    }

    pub fn get_status(&self) -> Result<DaemonStatus> {
        match self.send_command(DaemonCommand::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            DaemonResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn shutdown(&self) -> Result<DaemonResponse> {
        self.send_command(DaemonCommand::Shutdown)
    }

    fn submit(&self, command: DaemonCommand) -> PendingResult {
        let client = self.clone();
        PendingResult::spawn(move || match client.send_command(command)? {
            DaemonResponse::Result(payload) => Ok(payload),
            DaemonResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        })
    }
}
