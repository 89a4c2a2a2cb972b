use anyhow::{Context, Result};
use sda_github::{GitHubApi, GitHubClient};
use sda_protocol::{methods, JsonRpcRequest, JsonRpcResponse, RequestId, PARSE_ERROR};
use sda_sync::{GitRemote, JsonProjectStore, MemoryProjectStore, ProjectStore, SyncEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::handler::{RequestHandler, Session};

/// The main daemon server.
pub struct Server {
    config: Arc<Config>,
    handler: Arc<RequestHandler>,
    next_connection: AtomicU64,
}

impl Server {
    /// Build the server and its collaborators from `config`.
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn ProjectStore> = match &config.store.data_dir {
            Some(dir) => Arc::new(
                JsonProjectStore::open(dir)
                    .await
                    .with_context(|| format!("opening project store at {}", dir.display()))?,
            ),
            None => {
                info!("No data_dir configured, projects are kept in memory");
                Arc::new(MemoryProjectStore::new())
            }
        };

        let client = GitHubClient::new(&config.github).context("building GitHub client")?;
        if !client.has_token() {
            warn!("GitHub token not configured, @github commands will fail until it is set");
        }

        Ok(Self::with_parts(config, store, Arc::new(client)))
    }

    /// Build the server around existing collaborators.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn ProjectStore>,
        github: Arc<dyn GitHubApi>,
    ) -> Self {
        let config = Arc::new(config);
        let sync = Arc::new(SyncEngine::new(
            GitRemote::new(config.github.git_url.clone(), config.github.token.clone()),
            config.sync.work_dir(),
        ));
        let handler = Arc::new(RequestHandler::new(config.clone(), store, github, sync));

        Self {
            config,
            handler,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Run the daemon server, listening on Unix socket.
    pub async fn run(&self) -> Result<()> {
        let socket_path = &self.config.daemon.socket_path;

        // Clean up stale socket file
        if std::path::Path::new(socket_path).exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("removing stale socket {socket_path}"))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("binding {socket_path}"))?;
        info!(socket = %socket_path, "SDA daemon listening");

        let pid = std::process::id();
        std::fs::write(self.config.pid_path(), pid.to_string()).context("writing PID file")?;
        info!(pid = pid, "PID file written");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = self.handler.clone();
                    let config = self.config.clone();
                    let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, id, handler, config).await {
                            error!(error = %e, connection = id, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    id: u64,
    handler: Arc<RequestHandler>,
    config: Arc<Config>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (outbox, mut pending) = mpsc::unbounded_channel::<String>();

    // Responses and room notifications share one ordered writer.
    let writer_task = tokio::spawn(async move {
        while let Some(line) = pending.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let session = Session::new(id, outbox);
    debug!(connection = id, "Client connected");

    let result = serve(&mut BufReader::new(reader), &session, &handler).await;

    handler.disconnect(&session).await;
    drop(session);
    match writer_task.await {
        Ok(Err(e)) => warn!(connection = id, error = %e, "Failed writing to client"),
        Err(e) => warn!(connection = id, error = %e, "Writer task panicked"),
        Ok(Ok(())) => {}
    }
    debug!(connection = id, "Client disconnected");

    if let Ok(Flow::Shutdown) = result {
        info!("Shutting down");
        let _ = std::fs::remove_file(config.pid_path());
        let _ = std::fs::remove_file(&config.daemon.socket_path);
        std::process::exit(0);
    }
    result.map(drop)
}

enum Flow {
    Closed,
    Shutdown,
}

async fn serve(
    reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>,
    session: &Session,
    handler: &RequestHandler,
) -> Result<Flow> {
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            line.clear();
            continue;
        }

        let (response, shutdown) = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => {
                let is_shutdown = request.method == methods::SHUTDOWN;
                (handler.handle(request, session).await, is_shutdown)
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse request");
                let response = JsonRpcResponse::error(
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                    RequestId::Number(0),
                );
                (response, false)
            }
        };

        let json = serde_json::to_string(&response)?;
        if !session.send(json) {
            return Ok(Flow::Closed);
        }
        if shutdown {
            return Ok(Flow::Shutdown);
        }

        line.clear();
    }

    Ok(Flow::Closed)
}

/// Initialize tracing subscriber.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
