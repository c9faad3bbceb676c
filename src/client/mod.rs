use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::DaemonError;
use crate::models::{Answer, Config, Health, IndexStatus, IngestReport, SearchResults};
use crate::server::protocol::{
    IngestRequest, MAX_FRAME_LEN, QueryRequest, Request, Response, StatusResponse, decode_length,
    encode_message,
};

pub struct DaemonClient {
    socket_path: PathBuf,
    auto_start: bool,
}

impl DaemonClient {
    pub fn new(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path(),
            auto_start: config.daemon.auto_start,
        }
    }

    pub fn is_running(&self) -> bool {
        self.socket_path.exists()
            && std::os::unix::net::UnixStream::connect(&self.socket_path).is_ok()
    }

    pub async fn ensure_running(&self) -> Result<(), DaemonError> {
        if self.is_running() {
            return Ok(());
        }

        if !self.auto_start {
            return Err(DaemonError::NotRunning);
        }

        self.spawn_daemon()?;
        self.wait_for_ready().await
    }

    fn spawn_daemon(&self) -> Result<(), DaemonError> {
        let exe = std::env::current_exe().map_err(|e| DaemonError::SpawnError(e.to_string()))?;
        tracing::debug!(exe = %exe.display(), "starting daemon");

        Command::new(&exe)
            .args(["serve", "--daemon"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| DaemonError::SpawnError(e.to_string()))?;

        Ok(())
    }

    async fn wait_for_ready(&self) -> Result<(), DaemonError> {
        let max_wait = Duration::from_secs(60);
        let check_interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if self.is_running() && self.ping().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }

        Err(DaemonError::Timeout)
    }

    async fn connect(&self) -> Result<UnixStream, DaemonError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| DaemonError::ConnectionFailed(e.to_string()))
    }

    async fn send_request(&self, request: Request) -> Result<Response, DaemonError> {
        let mut stream = self.connect().await?;

        let encoded =
            encode_message(&request).map_err(|e| DaemonError::ProtocolError(e.to_string()))?;

        stream
            .write_all(&encoded)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let len = decode_length(&len_buf);
        if len > MAX_FRAME_LEN {
            return Err(DaemonError::ProtocolError(format!(
                "response frame of {len} bytes exceeds limit"
            )));
        }
        let mut msg_buf = vec![0u8; len];

        stream
            .read_exact(&mut msg_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        match serde_json::from_slice(&msg_buf)
            .map_err(|e| DaemonError::ProtocolError(e.to_string()))?
        {
            Response::Error(e) => Err(DaemonError::Remote(e.message)),
            response => Ok(response),
        }
    }

    /// Send `request`, starting the daemon first when allowed.
    async fn call(&self, request: Request) -> Result<Response, DaemonError> {
        self.ensure_running().await?;
        self.send_request(request).await
    }

    pub async fn ping(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Ping).await? {
            Response::Pong => Ok(()),
            _ => Err(unexpected()),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, DaemonError> {
        match self.send_request(Request::Status).await? {
            Response::Status(s) => Ok(s),
            _ => Err(unexpected()),
        }
    }

    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Shutdown).await? {
            Response::ShutdownAck => Ok(()),
            _ => Err(unexpected()),
        }
    }

    pub async fn health(&self) -> Result<Health, DaemonError> {
        match self.call(Request::Health).await? {
            Response::Health(h) => Ok(h),
            _ => Err(unexpected()),
        }
    }

    pub async fn ingest_content(
        &self,
        job_id: &str,
        file_name: &str,
        content: &str,
    ) -> Result<IngestReport, DaemonError> {
        self.ingest(IngestRequest {
            job_id: job_id.to_string(),
            file_name: file_name.to_string(),
            content: Some(content.to_string()),
            path: None,
        })
        .await
    }

    /// Ask the daemon to read and ingest `path`. Relative paths are resolved
    /// against the caller's working directory.
    pub async fn ingest_path(
        &self,
        job_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<IngestReport, DaemonError> {
        let path = std::path::absolute(path.as_ref())?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        self.ingest(IngestRequest {
            job_id: job_id.to_string(),
            file_name,
            content: None,
            path: Some(path),
        })
        .await
    }

    async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, DaemonError> {
        match self.call(Request::Ingest(request)).await? {
            Response::Ingest(report) => Ok(report),
            _ => Err(unexpected()),
        }
    }

    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<SearchResults, DaemonError> {
        let request = Request::Search(QueryRequest {
            query: query.to_string(),
            k,
        });
        match self.call(request).await? {
            Response::Search(results) => Ok(results),
            _ => Err(unexpected()),
        }
    }

    pub async fn generate(&self, query: &str, k: Option<usize>) -> Result<Answer, DaemonError> {
        let request = Request::Generate(QueryRequest {
            query: query.to_string(),
            k,
        });
        match self.call(request).await? {
            Response::Generate(answer) => Ok(answer),
            _ => Err(unexpected()),
        }
    }

    pub async fn rebuild(&self) -> Result<IndexStatus, DaemonError> {
        match self.call(Request::Rebuild).await? {
            Response::Index(status) => Ok(status),
            _ => Err(unexpected()),
        }
    }

    pub async fn clear(&self) -> Result<IndexStatus, DaemonError> {
        match self.call(Request::Clear).await? {
            Response::Index(status) => Ok(status),
            _ => Err(unexpected()),
        }
    }
}

fn unexpected() -> DaemonError {
    DaemonError::ProtocolError("unexpected response".to_string())
}

pub fn stop_daemon(config: &Config) -> Result<(), DaemonError> {
    let pid_path = config.pid_path();
    if !pid_path.exists() {
        return Err(DaemonError::NotRunning);
    }

    let pid_str = std::fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| DaemonError::ProtocolError("invalid pid file".to_string()))?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;
    }

    let _ = std::fs::remove_file(&pid_path);
    let _ = std::fs::remove_file(config.socket_path());

    Ok(())
}
