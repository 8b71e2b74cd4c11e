//! # Event Loop
//!
//! Owns a set of connections and drives them cooperatively. One
//! [`tick`](EventLoop::tick) waits at most `poll_interval` for any
//! connection to become ready, then processes every open connection.
//!
//! All handlers run on the task that calls `tick`. Nothing here locks;
//! use [`spawn`](EventLoop::spawn) to move the whole loop onto its own
//! tokio task.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::service::connection::Connection;
use crate::utils::timeout::POLL_INTERVAL;
use futures::future::select_all;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Handle to a connection registered with an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct EventLoop {
    connections: Vec<Option<Connection>>,
    poll_interval: Duration,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

impl EventLoop {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            connections: Vec::new(),
            poll_interval,
        }
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self::new(config.poll_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn add(&mut self, conn: Connection) -> ConnectionId {
        let slot = match self.connections.iter().position(Option::is_none) {
            Some(slot) => {
                self.connections[slot] = Some(conn);
                slot
            }
            None => {
                self.connections.push(Some(conn));
                self.connections.len() - 1
            }
        };
        debug!(id = slot, "connection registered");
        ConnectionId(slot)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.0).and_then(Option::as_ref)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Deregister a connection and hand it back. It is not closed.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.get_mut(id.0).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.connections.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any registered connection is still open.
    pub fn is_running(&self) -> bool {
        self.connections.iter().flatten().any(|c| !c.is_closed())
    }

    /// One bounded wait followed by a pass over every open connection.
    ///
    /// A handler error stops the pass and is returned; connections later
    /// in the pass are serviced on the next tick.
    pub async fn tick(&mut self) -> Result<()> {
        let waiting: Vec<_> = self
            .connections
            .iter()
            .flatten()
            .filter(|c| !c.is_closed())
            .map(|c| Box::pin(c.ready()))
            .collect();
        if waiting.is_empty() {
            return Ok(());
        }
        if tokio::time::timeout(self.poll_interval, select_all(waiting))
            .await
            .is_err()
        {
            trace!("poll interval elapsed without readiness");
        }

        for conn in self.connections.iter_mut().flatten() {
            if !conn.is_closed() {
                conn.process()?;
            }
        }
        Ok(())
    }

    /// Tick until every connection is closed.
    pub async fn run(&mut self) -> Result<()> {
        info!(connections = self.len(), "event loop started");
        while self.is_running() {
            self.tick().await?;
        }
        info!("event loop finished");
        Ok(())
    }

    /// Close every open connection, firing their `Close` handlers.
    pub fn close_all(&mut self) -> Result<()> {
        for conn in self.connections.iter_mut().flatten() {
            conn.close()?;
        }
        Ok(())
    }

    /// Run the loop on a tokio task. The loop is returned when it ends.
    pub fn spawn(mut self) -> JoinHandle<(Self, Result<()>)> {
        tokio::spawn(async move {
            let result = self.run().await;
            (self, result)
        })
    }
}
