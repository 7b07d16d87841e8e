//! The [`AuditSink`] trait and the built-in local sinks.

use crate::audit::SinkError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::Mutex;

/// Destination for serialized audit events.
///
/// Implementations own their failure policy; the emitter only observes the
/// returned error.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Short label for logs and metrics.
    fn name(&self) -> &str;

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError>;

    async fn flush(&self) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError>;
}

fn json_line(event: &Map<String, Value>) -> Result<Vec<u8>, SinkError> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

// =============================================================================
// Stdout
// =============================================================================

/// One JSON line per event on standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        let line = json_line(event)?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        tokio::io::stdout().flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

// =============================================================================
// File
// =============================================================================

/// Appends one JSON line per event to a file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory.
    ///
    /// # Errors
    ///
    /// `SinkError::Io` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn closed() -> SinkError {
    SinkError::Io(std::io::Error::other("sink is closed"))
}

#[async_trait]
impl AuditSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        let line = json_line(event)?;
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(closed)?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        if let Some(file) = self.file.lock().await.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

// =============================================================================
// Syslog
// =============================================================================

/// Syslog facility `auth` (4).
pub const SYSLOG_FACILITY_AUTH: u8 = 4;

/// Syslog severity `informational` (6).
pub const SYSLOG_SEVERITY_INFO: u8 = 6;

/// Sends each event as an RFC 5424-style UDP datagram whose message is the
/// event JSON.
pub struct SyslogSink {
    socket: UdpSocket,
    priority: u16,
    hostname: String,
}

impl SyslogSink {
    /// Connect to a syslog collector at `addr` with facility `auth`,
    /// severity `informational`.
    ///
    /// # Errors
    ///
    /// `SinkError::Io` if the socket cannot be bound or connected.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, SinkError> {
        Self::with_priority(addr, SYSLOG_FACILITY_AUTH, SYSLOG_SEVERITY_INFO).await
    }

    /// # Errors
    ///
    /// `SinkError::Io` if the socket cannot be bound or connected.
    pub async fn with_priority(
        addr: impl ToSocketAddrs,
        facility: u8,
        severity: u8,
    ) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let hostname = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "-".to_string());

        Ok(Self {
            socket,
            priority: u16::from(facility) * 8 + u16::from(severity & 0x07),
            hostname,
        })
    }

    fn format(&self, event: &Map<String, Value>) -> Result<String, SinkError> {
        let body = serde_json::to_string(event)?;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Ok(format!(
            "<{}>1 {timestamp} {} aaa - - - {body}",
            self.priority, self.hostname
        ))
    }
}

#[async_trait]
impl AuditSink for SyslogSink {
    fn name(&self) -> &str {
        "syslog"
    }

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        let message = self.format(event)?;
        self.socket.send(message.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

// =============================================================================
// Callback
// =============================================================================

type Callback = Box<dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// Hands each event to a caller-supplied closure.
pub struct CallbackSink {
    name: String,
    callback: Callback,
}

impl CallbackSink {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl AuditSink for CallbackSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        (self.callback)(event).map_err(SinkError::Callback)
    }

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
