use common::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::DaemonState;
use crate::connection::{self, Connection};
use crate::error::SessionError;
use crate::fetcher::{self, AssetFetcher};
use crate::protocol;
use crate::store::TaskStore;

/// Where and how to reach the task server.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tcp_address: String,
    pub secret: String,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
}

/// Owns the server connection and feeds received task lists into the store.
pub struct Session<F> {
    settings: SessionSettings,
    store: Arc<TaskStore>,
    fetcher: Arc<F>,
    state: Arc<Mutex<DaemonState>>,
    connection: Option<Connection>,
}

impl<F: AssetFetcher> Session<F> {
    pub fn new(
        settings: SessionSettings,
        store: Arc<TaskStore>,
        fetcher: Arc<F>,
        state: Arc<Mutex<DaemonState>>,
    ) -> Self {
        Self {
            settings,
            store,
            fetcher,
            state,
            connection: None,
        }
    }

    /// Run until shutdown or until the server rejects the secret.
    ///
    /// Network and protocol failures drop the connection and retry after the
    /// reconnect interval. A rejected secret is returned as an error and
    /// nothing is retried.
    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            if self.state.lock().await.should_exit {
                log::info!("Session stopped");
                return Ok(());
            }

            match self.connection.take() {
                None => match self.establish().await {
                    Ok(conn) => {
                        log::info!("Authenticated with {}", self.settings.tcp_address);
                        self.set_state(SessionState::Connected).await;
                        self.connection = Some(conn);
                    }
                    Err(e) if e.is_terminal() => {
                        log::error!("Authentication failed: {}. Not reconnecting.", e);
                        self.set_state(SessionState::Rejected).await;
                        return Err(e);
                    }
                    Err(e) => {
                        log::warn!(
                            "Connection to {} failed: {}. Retrying in {:?}",
                            self.settings.tcp_address,
                            e,
                            self.settings.reconnect_interval
                        );
                        self.set_state(SessionState::Backoff).await;
                        tokio::time::sleep(self.settings.reconnect_interval).await;
                    }
                },
                Some(mut conn) => match self.receive(&mut conn).await {
                    Ok(()) => self.connection = Some(conn),
                    Err(e) => {
                        log::warn!("Lost connection to task server: {}", e);
                        self.set_state(SessionState::Disconnected).await;
                    }
                },
            }
        }
    }

    async fn establish(&self) -> Result<Connection, SessionError> {
        let conn =
            connection::connect(&self.settings.tcp_address, self.settings.connect_timeout).await?;
        conn.authenticate(&self.settings.secret).await
    }

    /// Wait for one frame and, if one arrives, publish it as the new task
    /// list. Downloads are started before the list is published and are not
    /// awaited.
    async fn receive(&self, conn: &mut Connection) -> Result<(), SessionError> {
        let Some(frame) = conn.read_frame().await? else {
            return Ok(());
        };

        let tasks = protocol::decode_tasks(&frame);
        log::info!("Received task list with {} task(s)", tasks.len());

        for task in &tasks {
            fetcher::dispatch(&self.fetcher, task);
        }

        let acked = conn.acknowledge().await;
        self.store.replace(tasks).await;
        acked
    }

    async fn set_state(&self, session: SessionState) {
        self.state.lock().await.session = session;
    }
}
