use anyhow::Result;
use common::{Command, DaemonStatus, IpcError, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use crate::store::TaskStore;
use crate::{DaemonState, log_and_continue};

pub async fn start(state: Arc<Mutex<DaemonState>>, store: Arc<TaskStore>) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    serve(listener, state, store).await;

    log_and_continue!(std::fs::remove_file(&socket_path), "remove IPC socket");
    log::info!("IPC server stopped");
    Ok(())
}

/// Accept clients until the shutdown flag is set.
async fn serve(listener: UnixListener, state: Arc<Mutex<DaemonState>>, store: Arc<TaskStore>) {
    loop {
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    log_and_continue!(handle_client(stream, state, store).await, "handle IPC client");
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    store: Arc<TaskStore>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state, &store).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(IpcError::from(e))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    store: &TaskStore,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Query => {
            // Take the task snapshot first; the store lock is never held
            // together with the state lock.
            let tasks = store.status().await;
            let state = state.lock().await;
            Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: state.uptime_secs(),
                session: state.session,
                rotation: state.rotation,
                current_wallpaper: state.current_wallpaper.clone(),
                tasks,
            })
        }

        Command::Kill => {
            log::info!("Received kill command");
            state.lock().await.should_exit = true;
            Response::Ok
        }
    }
}
