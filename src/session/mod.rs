//! Live sessions and the duplex clients that watch them.
//!
//! Sessions are keyed by id and own the child's stdin. Clients are keyed by a
//! connection id and carry an optional session tag; events for a session go to
//! every client currently tagged with its id.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Instant,
};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncWriteExt,
    process::ChildStdin,
    sync::mpsc,
};
use tracing::debug;

pub type SessionId = String;
pub type ClientId = u64;

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    Output(String),
    Error(String),
    Completed(String),
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Register {
        #[serde(rename = "processId")]
        process_id: SessionId,
    },
    Input {
        #[serde(rename = "processId")]
        process_id: SessionId,
        data: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session already active: {0}")]
    AlreadyActive(SessionId),
}

/// One running interpreter.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    pid: Option<u32>,
    started: Instant,
    input: Mutex<Option<mpsc::UnboundedSender<String>>>,
    terminal: AtomicBool,
}

impl Session {
    /// Takes ownership of the child's stdin. Lines are written by a separate
    /// task so a child that never reads cannot stall the caller.
    pub fn new(id: SessionId, pid: Option<u32>, stdin: Option<ChildStdin>) -> Self {
        let input = stdin.map(|stdin| spawn_stdin_writer(id.clone(), stdin));
        Self {
            id,
            pid,
            started: Instant::now(),
            input: Mutex::new(input),
            terminal: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// One-shot transition to terminal. Only the first caller gets `true`.
    pub fn mark_terminal(&self) -> bool {
        self.terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Queues `data` plus a newline for stdin. Returns `false` when the
    /// session is finished or its pipe has closed; the input is dropped.
    pub fn write_line(&self, data: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        let input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        match input.as_ref() {
            Some(tx) => tx.send(format!("{data}\n")).is_ok(),
            None => false,
        }
    }

    /// Stops accepting input. The writer closes stdin once its queue drains.
    pub fn close_stdin(&self) {
        self.input.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

fn spawn_stdin_writer(id: SessionId, mut stdin: ChildStdin) -> mpsc::UnboundedSender<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                debug!(session = %id, error = %e, "stdin closed, dropping input");
                break;
            }
        }
    });
    tx
}

struct ClientSlot {
    tag: Option<SessionId>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: DashMap<SessionId, Arc<Session>>,
    clients: DashMap<ClientId, ClientSlot>,
    next_client: AtomicU64,
}

/// Process-wide session and client table. Cheap to clone.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        match self.inner.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyActive(session.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.sessions.contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Adds an untagged client. The slot lives as long as the handle.
    pub fn connect(&self) -> (ClientHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.clients.insert(id, ClientSlot { tag: None, tx });
        (ClientHandle { id, registry: self.clone() }, rx)
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    fn tag(&self, client: ClientId, session: SessionId) {
        if let Some(mut slot) = self.inner.clients.get_mut(&client) {
            slot.tag = Some(session);
        }
    }

    fn disconnect(&self, client: ClientId) {
        self.inner.clients.remove(&client);
    }

    /// Sends `event` to every client tagged with `session`. Returns how many got it.
    pub fn publish(&self, session: &str, event: &ServerEvent) -> usize {
        self.inner
            .clients
            .iter()
            .filter(|slot| slot.tag.as_deref() == Some(session))
            .filter(|slot| slot.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Sends the final `completed` event, then clears the tag on those clients.
    pub fn complete(&self, session: &str, output: &str) -> usize {
        let event = ServerEvent::Completed(output.to_string());
        let mut delivered = 0;
        for mut slot in self.inner.clients.iter_mut() {
            if slot.tag.as_deref() != Some(session) {
                continue;
            }
            if slot.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
            slot.tag = None;
        }
        delivered
    }

    /// Forwards a line to the session's stdin, if the session is live.
    /// Never waits on the child.
    pub fn send_input(&self, session: &str, data: &str) -> bool {
        match self.get(session) {
            Some(s) => s.write_line(data),
            None => false,
        }
    }
}

/// A connected duplex client. Dropping it unregisters the client.
pub struct ClientHandle {
    id: ClientId,
    registry: SessionRegistry,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn register(&self, session: SessionId) {
        self.registry.tag(self.id, session);
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}
