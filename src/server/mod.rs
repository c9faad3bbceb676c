pub mod embedding;
pub mod protocol;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{Config, Document, Health};
use crate::server::protocol::{
    MAX_FRAME_LEN, Request, Response, StatusResponse, decode_length, encode_message,
};
use crate::services::{IndexService, MetricsStore};

/// Unix-socket front end for one [`IndexService`].
///
/// Every connection is served on its own task; the index service handles
/// writer serialisation, so readers proceed while an ingest runs.
pub struct DaemonServer {
    config: Config,
    socket_path: PathBuf,
    service: Arc<IndexService>,
    metrics: Option<Mutex<MetricsStore>>,
    last_request: RwLock<Instant>,
    requests_served: AtomicU64,
    shutdown: AtomicBool,
}

impl DaemonServer {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let service = Arc::new(IndexService::open(config.clone()).await?);
        Ok(Self::with_service(config, service))
    }

    pub fn with_service(config: Config, service: Arc<IndexService>) -> Self {
        let metrics = if config.metrics.enabled {
            Config::metrics_db_path().and_then(|path| match MetricsStore::open(&path) {
                Ok(store) => {
                    store.cleanup(config.metrics.retention_days);
                    tracing::info!(
                        retention_days = config.metrics.retention_days,
                        "metrics enabled"
                    );
                    Some(Mutex::new(store))
                }
                Err(e) => {
                    tracing::warn!("failed to open metrics database: {e}");
                    None
                }
            })
        } else {
            None
        };

        Self {
            socket_path: config.socket_path(),
            config,
            service,
            metrics,
            last_request: RwLock::new(Instant::now()),
            requests_served: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub async fn run(self: Arc<Self>) -> Result<(), std::io::Error> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.write_pid_file()?;

        tracing::info!(
            socket = %self.socket_path.display(),
            idle_timeout_secs = self.config.daemon.idle_timeout_secs,
            "daemon listening"
        );

        let idle_timeout = Duration::from_secs(self.config.daemon.idle_timeout_secs);
        let check_interval = Duration::from_secs(1);
        let terminate = terminate_signal();
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            *self.last_request.write().await = Instant::now();
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                server.handle_connection(stream).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!("accept error: {e}");
                        }
                    }
                }
                _ = tokio::time::sleep(check_interval) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    let last = *self.last_request.read().await;
                    if last.elapsed() > idle_timeout {
                        tracing::info!("idle timeout reached, shutting down");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                    break;
                }
                _ = &mut terminate => {
                    tracing::info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    async fn handle_connection(&self, mut stream: UnixStream) {
        let mut len_buf = [0u8; 4];

        while stream.read_exact(&mut len_buf).await.is_ok() {
            let len = decode_length(&len_buf);
            if len > MAX_FRAME_LEN {
                tracing::warn!(len, "frame too large, closing connection");
                break;
            }

            let mut msg_buf = vec![0u8; len];
            if stream.read_exact(&mut msg_buf).await.is_err() {
                break;
            }

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => Response::error(format!("invalid request: {e}")),
            };
            self.requests_served.fetch_add(1, Ordering::Relaxed);
            *self.last_request.write().await = Instant::now();

            if let Ok(encoded) = encode_message(&response)
                && stream.write_all(&encoded).await.is_err()
            {
                break;
            }

            if matches!(response, Response::ShutdownAck) {
                break;
            }
        }
    }

    async fn handle_request(&self, request: Request) -> Response {
        let operation = request.operation();
        let start = Instant::now();
        let response = self.dispatch(request).await;

        if !matches!(operation, "ping" | "status" | "shutdown") {
            self.record(operation, start.elapsed().as_millis() as u64, !response.is_error());
        }
        if let Response::Error(ref e) = response {
            tracing::warn!(operation, "request failed: {}", e.message);
        }
        response
    }

    async fn dispatch(&self, request: Request) -> Response {
        let default_k = self.config.search.default_k;
        match request {
            Request::Ping => Response::Pong,

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                Response::ShutdownAck
            }

            Request::Health => Response::Health(Health::ok()),

            Request::Status => {
                let last = *self.last_request.read().await;
                let metrics = self.metrics.as_ref().and_then(|m| {
                    m.lock()
                        .ok()
                        .map(|store| store.get_summary(self.config.metrics.retention_days))
                });
                Response::Status(StatusResponse {
                    running: true,
                    pid: std::process::id(),
                    idle_secs: last.elapsed().as_secs(),
                    requests_served: self.requests_served.load(Ordering::Relaxed),
                    index: self.service.status().await,
                    metrics,
                })
            }

            Request::Ingest(req) => {
                let document = match Document::try_from(req) {
                    Ok(document) => document,
                    Err(e) => return Response::error(e.to_string()),
                };
                match self.service.ingest(document).await {
                    Ok(report) => Response::Ingest(report),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::Search(req) => {
                match self.service.search(&req.query, req.k.unwrap_or(default_k)).await {
                    Ok(results) => Response::Search(results),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::Generate(req) => {
                match self.service.generate(&req.query, req.k.unwrap_or(default_k)).await {
                    Ok(answer) => Response::Generate(answer),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::Rebuild => match self.service.rebuild().await {
                Ok(status) => Response::Index(status),
                Err(e) => Response::error(e.to_string()),
            },

            Request::Clear => match self.service.clear().await {
                Ok(status) => Response::Index(status),
                Err(e) => Response::error(e.to_string()),
            },
        }
    }

    fn record(&self, operation: &str, latency_ms: u64, success: bool) {
        if let Some(metrics) = &self.metrics
            && let Ok(store) = metrics.lock()
        {
            store.record(operation, latency_ms, success);
        }
    }

    fn write_pid_file(&self) -> Result<(), std::io::Error> {
        std::fs::write(self.config.pid_path(), std::process::id().to_string())
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(self.config.pid_path());
        tracing::info!("daemon stopped");
    }
}

/// Resolves on SIGTERM; never resolves where that signal is unavailable.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
            return;
        }
    }
    std::future::pending::<()>().await
}

pub async fn run_daemon(config: Config) -> Result<(), AppError> {
    let server = Arc::new(DaemonServer::new(config).await?);
    server
        .run()
        .await
        .map_err(|e| AppError::Daemon(e.into()))
}
