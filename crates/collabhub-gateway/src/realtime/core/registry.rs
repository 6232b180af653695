use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::realtime::types::PreparedMsg;

/// Process-unique connection id. Allocated by the registry, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The session is gone or the connection was already closed.
    Closed,
    /// The outbound queue stayed full for the whole wait: the client is stuck.
    Stalled,
}

impl DeliveryFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryFailure::Closed => "closed",
            DeliveryFailure::Stalled => "stalled",
        }
    }
}

/// Handle to one open socket: its outbound queue plus a close signal.
///
/// The socket itself is owned by the session tasks; everything else only ever
/// holds this handle.
#[derive(Clone)]
pub struct Connection {
    id: ConnId,
    tx: mpsc::Sender<PreparedMsg>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(id: ConnId, tx: mpsc::Sender<PreparedMsg>) -> Self {
        Self {
            id,
            tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a frame. A full queue is waited on for at most `wait`; a queue
    /// that stays full that long belongs to a client that stopped reading.
    pub async fn deliver(&self, msg: PreparedMsg, wait: Duration) -> Result<(), DeliveryFailure> {
        if self.is_closed() {
            return Err(DeliveryFailure::Closed);
        }
        let msg = match self.tx.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(DeliveryFailure::Closed),
            Err(mpsc::error::TrySendError::Full(msg)) => msg,
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(DeliveryFailure::Closed),
            res = timeout(wait, self.tx.send(msg)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(DeliveryFailure::Closed),
                Err(_) => Err(DeliveryFailure::Stalled),
            },
        }
    }

    /// Ask the session tasks to shut the socket down. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Set of currently open connections, keyed by `ConnId`.
///
/// Iteration and mutation go through `DashMap` shard locks. Callers never
/// remove while iterating: `snapshot` copies the handles out first.
pub struct ConnectionRegistry {
    conns: DashMap<ConnId, Connection>,
    seq: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnId {
        ConnId(self.seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a connection. Returns false (and keeps the existing entry) if the
    /// id is already registered.
    pub fn register(&self, conn: Connection) -> bool {
        match self.conns.entry(conn.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(conn);
                true
            }
        }
    }

    /// Remove a connection if present. Removing an unknown id is a no-op.
    pub fn deregister(&self, id: ConnId) -> Option<Connection> {
        self.conns.remove(&id).map(|(_, conn)| conn)
    }

    /// Point-in-time copy of the current members.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.conns.iter().map(|r| r.value().clone()).collect()
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.conns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
