//! Connection reactor
//!
//! Single-task readiness multiplexer over the daemon's I/O endpoints: the IR
//! device byte stream, the command listener, accepted command clients, and
//! outbound remote-control peers. Connections live in an insertion-ordered
//! list and are dispatched by kind; one poll cycle either reports the first
//! connection to become ready (error conditions outranking plain
//! readability) or, after the quiescence interval, the idle subscribers in
//! list order. All decode and dispatch work happens between polls on the
//! same task, so shared server state needs no locking.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use futures::future::select_all;
use futures::FutureExt;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

pub type ConnectionId = u64;

/// Connection role, dispatched by kind rather than by callback pointer.
#[derive(Debug)]
pub enum ConnKind {
    /// Byte stream forwarded from the IR device reader thread. The only
    /// connection with idle-timeout interest: receiver silence drives the
    /// decoder's packet flush.
    IrBytes { rx: mpsc::Receiver<Vec<u8>> },
    /// Command-protocol listener.
    Listener { listener: TcpListener },
    /// Accepted command client plus its partial-line buffer.
    Command { stream: TcpStream, line: Vec<u8> },
    /// Outbound remote-control peer.
    Peer { stream: TcpStream },
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub label: String,
    pub kind: ConnKind,
    idle: bool,
}

impl Connection {
    /// Wait until this connection has something for its handler.
    async fn wait_ready(&mut self) -> Event {
        match &mut self.kind {
            ConnKind::IrBytes { rx } => match rx.recv().await {
                Some(bytes) => Event::IrData(bytes),
                None => Event::IrClosed,
            },
            ConnKind::Listener { listener } => Event::Incoming(listener.accept().await),
            ConnKind::Command { stream, .. } | ConnKind::Peer { stream } => {
                match stream.ready(Interest::READABLE).await {
                    // Error state outranks readability for this connection.
                    Ok(ready) if ready.is_error() => Event::Exception,
                    Ok(_) => Event::Readable,
                    Err(_) => Event::Exception,
                }
            }
        }
    }
}

/// What a connection became ready for.
#[derive(Debug)]
pub enum Event {
    /// Bytes arrived from the IR device reader thread.
    IrData(Vec<u8>),
    /// The IR byte channel closed: the reader thread is gone, and with it
    /// the mandatory receiver input.
    IrClosed,
    /// The listener has a connection to accept.
    Incoming(std::io::Result<(TcpStream, SocketAddr)>),
    /// The socket is readable (data or EOF, reported by the next read).
    Readable,
    /// Socket-level exceptional condition.
    Exception,
}

/// Result of one poll cycle.
#[derive(Debug)]
pub enum Polled {
    /// Nothing became ready within the quiescence interval. Carries the
    /// idle-subscribed connections in list order.
    Idle(Vec<ConnectionId>),
    Ready(ConnectionId, Event),
}

pub struct Reactor {
    connections: Vec<Connection>,
    next_id: ConnectionId,
    quiescence: Duration,
}

impl Reactor {
    pub fn new(quiescence: Duration) -> Self {
        Self {
            connections: Vec::new(),
            next_id: 1,
            quiescence,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn add(&mut self, label: String, kind: ConnKind, idle: bool) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        debug!("Registering connection '{}' (#{})", label, id);
        self.connections.push(Connection {
            id,
            label,
            kind,
            idle,
        });
        id
    }

    /// Register the IR device byte channel. Subscribes to idle timeouts so
    /// receiver silence reaches the decoder.
    pub fn add_ir_channel(
        &mut self,
        label: impl Into<String>,
        rx: mpsc::Receiver<Vec<u8>>,
    ) -> ConnectionId {
        self.add(label.into(), ConnKind::IrBytes { rx }, true)
    }

    /// Bind the command listener. Failure to bind is fatal: once configured,
    /// the command server is a required input.
    pub async fn listen(&mut self, addr: SocketAddr) -> Result<(ConnectionId, SocketAddr)> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Couldn't listen on {}", addr))?;
        let local = listener.local_addr()?;
        let id = self.add(
            format!("listen {}", local),
            ConnKind::Listener { listener },
            false,
        );
        Ok((id, local))
    }

    /// Register an accepted command client.
    pub fn add_command(&mut self, label: impl Into<String>, stream: TcpStream) -> ConnectionId {
        self.add(
            label.into(),
            ConnKind::Command {
                stream,
                line: Vec::new(),
            },
            false,
        )
    }

    /// Dial an outbound remote peer. Peers are optional: a failed dial is
    /// reported as `None` and retried later by the server's reconnect clock.
    pub async fn connect_peer(
        &mut self,
        label: impl Into<String>,
        host: &str,
        port: u16,
    ) -> Option<ConnectionId> {
        let label = label.into();
        match TcpStream::connect((host, port)).await {
            Ok(stream) => Some(self.add(label, ConnKind::Peer { stream }, false)),
            Err(e) => {
                debug!("Couldn't reach peer '{}' at {}:{}: {}", label, host, port, e);
                None
            }
        }
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    /// Drop a connection from the list. Never requeues; the caller owns
    /// closing whatever the connection wrapped (dropping it does).
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        let conn = self.connections.remove(index);
        debug!("Removed connection '{}' (#{})", conn.label, conn.id);
        Some(conn)
    }

    /// Write to a command client or peer socket.
    pub async fn write(&mut self, id: ConnectionId, data: &[u8]) -> std::io::Result<()> {
        let conn = self
            .get_mut(id)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such connection"))?;
        match &mut conn.kind {
            ConnKind::Command { stream, .. } | ConnKind::Peer { stream } => {
                stream.write_all(data).await
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "connection is not writable",
            )),
        }
    }

    /// Run one poll cycle: wait up to the quiescence interval for any
    /// connection to become ready.
    ///
    /// Polling with zero registered connections is a precondition violation
    /// and fatal: the daemon would otherwise spin forever with no inputs.
    pub async fn poll_once(&mut self) -> Result<Polled> {
        if self.connections.is_empty() {
            bail!("Attempt to poll a reactor with no connections");
        }
        let quiescence = self.quiescence;
        let ready_futures: Vec<_> = self
            .connections
            .iter_mut()
            .map(|conn| {
                let id = conn.id;
                async move { (id, conn.wait_ready().await) }.boxed_local()
            })
            .collect();

        // Reduce to owned data so the readiness futures (and their borrows
        // of the connection list) are dropped before the idle arm runs.
        let ready = match timeout(quiescence, select_all(ready_futures)).await {
            Err(_) => None,
            Ok(((id, event), _, _)) => Some((id, event)),
        };
        match ready {
            None => Ok(Polled::Idle(
                self.connections
                    .iter()
                    .filter(|c| c.idle)
                    .map(|c| c.id)
                    .collect(),
            )),
            Some((id, event)) => Ok(Polled::Ready(id, event)),
        }
    }
}
