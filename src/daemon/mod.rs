// Daemon module: serves chat turns and session requests over a Unix socket

mod ipc;
mod signals;

pub use ipc::{
    read_frame, read_message, write_frame, write_response, IpcClient, IpcMessage, IpcResponse,
    IpcServer,
};
pub use signals::{ShutdownSignal, SignalHandler};

use crate::config::{expand_tilde, Config};
use crate::delivery::Deliverer;
use crate::embedding::provider_from_config;
use crate::error::{GroundchatError, Result};
use crate::llm::OpenAiChat;
use crate::orchestrator::{Orchestrator, TurnRequest};
use crate::storage::StorageManager;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::Semaphore;

/// Everything a client request can reach
pub struct Services {
    pub orchestrator: Orchestrator,
    pub deliverer: Deliverer,
}

impl Services {
    /// Build the production collaborators from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = StorageManager::new(config.data_dir())?;
        let provider = provider_from_config(&config.embedding)?;
        let chat = Arc::new(OpenAiChat::from_config(&config.llm)?);
        let orchestrator =
            Orchestrator::from_config(config, storage.database.clone(), provider, chat)?;
        let deliverer = Deliverer::from_config(&config.delivery)?;

        Ok(Self {
            orchestrator,
            deliverer,
        })
    }

    /// Answer one request; failures become error responses
    pub async fn handle(&self, message: IpcMessage) -> IpcResponse {
        match self.dispatch(message).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_recoverable() {
                    tracing::warn!("Request failed: {}", e);
                } else {
                    tracing::error!("Request failed: {}", e);
                }
                IpcResponse::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, message: IpcMessage) -> Result<IpcResponse> {
        let response = match message {
            IpcMessage::Chat {
                messages,
                session_id,
            } => {
                let reply = self
                    .orchestrator
                    .handle_turn(TurnRequest {
                        messages,
                        session_id,
                    })
                    .await?;
                IpcResponse::success_with_data(to_json(&reply)?)
            }
            IpcMessage::Session { id } => {
                let summary = self.orchestrator.lookup_session(&id)?;
                IpcResponse::success_with_data(to_json(&summary)?)
            }
            IpcMessage::Deliver { session_id } => {
                let profile = self.orchestrator.get_profile(&session_id)?;
                let outcome = self.deliverer.deliver_session(&profile).await;
                IpcResponse::success_with_data(to_json(&outcome)?)
            }
            IpcMessage::Status => {
                let index = self.orchestrator.retriever().indexer().current();
                IpcResponse::success_with_data(json!({
                    "version": crate::VERSION,
                    "sessions": self.orchestrator.database().session_count()?,
                    "index_built": index.is_some(),
                    "chunks": index.as_ref().map(|i| i.len()),
                    "source_digest": index.as_ref().and_then(|i| i.source_digest().map(String::from)),
                }))
            }
        };
        Ok(response)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| GroundchatError::Json {
        source: e,
        context: "Failed to encode response data".to_string(),
    })
}

/// Foreground daemon owning the socket and the shared services
pub struct Daemon {
    config: Config,
    services: Arc<Services>,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        let services = Arc::new(Services::from_config(&config)?);
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: Config, services: Arc<Services>) -> Self {
        Self { config, services }
    }

    /// Serve until SIGTERM, SIGINT or SIGHUP
    pub async fn run_foreground(&self) -> Result<()> {
        tracing::info!("Daemon starting in foreground mode");

        let mut signal_handler = SignalHandler::new()?;

        let mut ipc_server = IpcServer::new(expand_tilde(&self.config.daemon.socket_path));
        ipc_server.bind().await?;

        self.spawn_index_warmup();
        tracing::info!("Daemon started successfully");

        self.serve(&ipc_server, async move {
            let sig = signal_handler.wait().await;
            tracing::info!("Shutdown signal received ({:?})", sig);
        })
        .await;

        tracing::info!("Shutting down daemon");
        ipc_server.shutdown()?;
        tracing::info!("Daemon shutdown complete");

        Ok(())
    }

    /// Accept clients on `ipc_server` until `shutdown` completes
    ///
    /// At most `daemon.max_connections` clients are handled at once. Waiting for a free slot
    /// and waiting for a client both yield to `shutdown`.
    pub async fn serve<F>(&self, ipc_server: &IpcServer, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let limit = Arc::new(Semaphore::new(self.config.daemon.max_connections.max(1)));
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = &mut shutdown => break,
            };

            tokio::select! {
                accepted = ipc_server.accept() => {
                    let stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let services = Arc::clone(&self.services);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, services).await {
                            tracing::error!("Client handler error: {}", e);
                        }
                        drop(permit);
                    });
                }

                _ = &mut shutdown => break,
            }
        }
    }

    fn spawn_index_warmup(&self) {
        let services = Arc::clone(&self.services);
        tokio::spawn(async move {
            match services.orchestrator.retriever().warm().await {
                Ok(chunks) => tracing::info!("Knowledge index ready ({} chunks)", chunks),
                Err(e) => tracing::warn!("Knowledge index warmup failed, will retry on demand: {}", e),
            }
        });
    }
}

async fn handle_client(mut stream: UnixStream, services: Arc<Services>) -> Result<()> {
    let message = read_message(&mut stream).await?;
    let response = services.handle(message).await;
    write_response(&mut stream, &response).await
}
