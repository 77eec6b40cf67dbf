// Inter-process communication via Unix domain sockets with length-prefixed JSON protocol

use crate::error::{GroundchatError, Result};
use crate::llm::ChatMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum frame size (10MB)
const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Requests sent from the CLI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcMessage {
    /// One conversational turn
    Chat {
        messages: Vec<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Look up a session's collected fields
    Session { id: String },
    /// Deliver a session report
    Deliver { session_id: String },
    /// Request daemon status
    Status,
}

/// IPC response message sent from daemon back to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IpcResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn success_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Deserialize the payload into `T`
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| GroundchatError::Daemon("Response carried no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| GroundchatError::Json {
            source: e,
            context: "Failed to decode response data".to_string(),
        })
    }
}

/// Unix domain socket server for IPC
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind to the socket path, replacing a stale socket file
    pub async fn bind(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to remove existing socket: {:?}", self.socket_path),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to create socket directory: {:?}", parent),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to bind to socket: {:?}", self.socket_path),
        })?;

        self.listener = Some(listener);

        tracing::info!("IPC server listening on {:?}", self.socket_path);
        Ok(())
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| GroundchatError::Daemon("Server not bound".to_string()))?;

        let (stream, _addr) = listener.accept().await.map_err(|e| GroundchatError::Io {
            source: e,
            context: "Failed to accept connection".to_string(),
        })?;

        Ok(stream)
    }

    /// Remove the socket file
    pub fn shutdown(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to remove socket: {:?}", self.socket_path),
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read one length-prefixed JSON frame
pub async fn read_frame<T, R>(stream: &mut R, what: &str) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let length = stream.read_u32().await.map_err(|e| GroundchatError::Io {
        source: e,
        context: format!("Failed to read {} length", what),
    })?;

    if length > MAX_MESSAGE_SIZE {
        return Err(GroundchatError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what, length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to read {} payload", what),
        })?;

    serde_json::from_slice(&buffer).map_err(|e| GroundchatError::Json {
        source: e,
        context: format!("Failed to deserialize {}", what),
    })
}

/// Write one length-prefixed JSON frame (4-byte big-endian length)
pub async fn write_frame<T, W>(stream: &mut W, value: &T, what: &str) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(value).map_err(|e| GroundchatError::Json {
        source: e,
        context: format!("Failed to serialize {}", what),
    })?;

    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(GroundchatError::Daemon(format!(
            "{} too large: {} bytes (max: {})",
            what,
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    stream
        .write_u32(payload.len() as u32)
        .await
        .map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to write {} length", what),
        })?;
    stream
        .write_all(&payload)
        .await
        .map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to write {} payload", what),
        })?;
    stream.flush().await.map_err(|e| GroundchatError::Io {
        source: e,
        context: format!("Failed to flush {}", what),
    })?;

    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<IpcMessage> {
    read_frame(stream, "IPC message").await
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    stream: &mut W,
    response: &IpcResponse,
) -> Result<()> {
    write_frame(stream, response, "IPC response").await
}

/// IPC client for sending messages to the daemon
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Connect, send one message and wait for its response
    pub async fn send(&self, message: &IpcMessage) -> Result<IpcResponse> {
        let mut stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| GroundchatError::Io {
                    source: e,
                    context: format!("Failed to connect to daemon at {:?}", self.socket_path),
                })?;

        write_frame(&mut stream, message, "IPC message").await?;
        read_frame(&mut stream, "IPC response").await
    }
}
