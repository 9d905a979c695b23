//! Control socket.
//!
//! A Unix stream socket speaking a line protocol. Each request line is
//! answered with the command output followed by an empty line:
//!
//! | Request | Reply |
//! |---------|-------|
//! | `intfd/dump [IFACE]` | forwarding state of one or all interfaces |
//! | `intfd/dump-json [IFACE]` | the forwarding-state maps as JSON |
//! | `exit` | `OK`, then the daemon shuts down |
//!
//! Failed requests are answered with `ERROR: <reason>`.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{IntfdError, IntfdResult};

/// A parsed control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Text dump of one or all interfaces
    Dump(Option<String>),
    /// JSON dump of one or all interfaces
    DumpJson(Option<String>),
    /// Stop the daemon
    Exit,
}

impl ControlCommand {
    /// Parses one request line.
    pub fn parse(line: &str) -> IntfdResult<Self> {
        let mut words = line.split_whitespace();
        let command = words
            .next()
            .ok_or_else(|| IntfdError::control("empty request"))?;
        let argument = words.next().map(str::to_string);
        if words.next().is_some() {
            return Err(IntfdError::control(format!(
                "too many arguments for {}",
                command
            )));
        }

        match (command, argument) {
            ("intfd/dump", interface) => Ok(Self::Dump(interface)),
            ("intfd/dump-json", interface) => Ok(Self::DumpJson(interface)),
            ("exit", None) => Ok(Self::Exit),
            ("exit", Some(_)) => Err(IntfdError::control("exit takes no arguments")),
            (other, _) => Err(IntfdError::control(format!("unknown command: {}", other))),
        }
    }
}

/// Reply to a control request: output text or an error message.
pub type ControlReply = Result<String, String>;

/// A request forwarded to the daemon loop.
#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlReply>,
}

/// Accepts control connections and forwards their requests.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds the control socket, replacing a stale socket file.
    pub fn bind(path: impl AsRef<Path>) -> IntfdResult<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale control socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        info!("Control socket listening on {}", path.display());
        Ok(Self { listener, path })
    }

    /// Returns the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serves connections until the daemon loop drops its receiver.
    pub async fn serve(self, requests: mpsc::Sender<ControlRequest>) {
        loop {
            let stream = tokio::select! {
                _ = requests.closed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("Control socket accept failed: {}", e);
                        continue;
                    }
                },
            };

            let requests = requests.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, requests).await {
                    debug!("Control connection closed: {}", e);
                }
            });
        }
        debug!("Control server stopped");
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(
    stream: UnixStream,
    requests: mpsc::Sender<ControlRequest>,
) -> IntfdResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match ControlCommand::parse(&line) {
            Ok(command) => dispatch(&requests, command).await,
            Err(e) => Err(e.to_string()),
        };

        let text = match reply {
            Ok(output) => output,
            Err(reason) => format!("ERROR: {}\n", reason),
        };
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

async fn dispatch(requests: &mpsc::Sender<ControlRequest>, command: ControlCommand) -> ControlReply {
    let (reply, response) = oneshot::channel();
    requests
        .send(ControlRequest { command, reply })
        .await
        .map_err(|_| "daemon is shutting down".to_string())?;
    response
        .await
        .map_err(|_| "daemon dropped the request".to_string())?
}
