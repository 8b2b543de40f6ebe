//! Bounded TCP accept.
//!
//! A connection slot is taken before `accept` is called, so once the
//! configured number of connections is open the kernel backlog absorbs new
//! clients instead of the process. Slots come back when the connection task
//! drops its [`ConnectionPermit`], even if that task panicked.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("connection limiter closed")]
    Closed,
}

impl ListenerError {
    /// Accept failures that concern a single connection, not the listener.
    pub fn is_transient(&self) -> bool {
        match self {
            ListenerError::Accept(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// One accepted client connection and the slot it occupies.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub permit: ConnectionPermit,
}

/// Held for as long as a connection is open.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}

/// TCP listener capped at a fixed number of open connections.
pub struct Listener {
    tcp: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    /// Bind `config.bind_address`.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(ErrorKind::InvalidInput, e)))?;
        let tcp = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Ok(Self::new(tcp, config.max_connections))
    }

    /// Cap an already bound listener at `capacity` connections.
    pub fn new(tcp: TcpListener, capacity: usize) -> Self {
        if let Ok(address) = tcp.local_addr() {
            tracing::info!(address = %address, max_connections = capacity, "Listener bound");
        }
        Self {
            tcp,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot, then for the next client.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.tcp.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(peer = %peer, free_slots = self.slots.available_permits(), "Connection accepted");
        Ok(Accepted {
            stream,
            peer,
            permit: ConnectionPermit { _slot: slot },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
