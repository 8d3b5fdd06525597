//! TCP control transport
//!
//! Each connection carries newline-delimited JSON envelopes. Inbound
//! envelopes are dispatched with the sender prefixed by `/tcp/<conn>`;
//! anything dispatched to `/tcp/<conn>/...` is written back to that
//! connection. The CLI talks to a running node this way.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use hive_core::{Address, Envelope, HiveError, HiveResult, Message};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_wire::{decode_envelope, encode_envelope};

type Connections = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>>;

/// `/tcp`
pub fn tcp_address() -> Address {
    Address::from_segments(["tcp"])
}

fn transport_error(e: std::io::Error) -> HiveError {
    HiveError::TransportError(e.to_string())
}

/// Accepts control connections and routes replies back to them
pub struct TcpControlListener {
    bind: SocketAddr,
    mailbox: Mailbox,
    dispatcher: Dispatcher,
    listener: Option<TcpListener>,
    next_conn: u64,
}

impl TcpControlListener {
    /// `mailbox` must be registered at [`tcp_address`]
    pub fn new(bind: SocketAddr, mailbox: Mailbox, dispatcher: &Dispatcher) -> Self {
        TcpControlListener {
            bind,
            mailbox,
            dispatcher: dispatcher.clone(),
            listener: None,
            next_conn: 0,
        }
    }

    pub async fn bind(&mut self) -> HiveResult<SocketAddr> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(self.bind).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::AddrInUse {
                    HiveError::AddressInUse(self.bind.to_string())
                } else {
                    transport_error(e)
                }
            })?,
        };
        let local = listener.local_addr().map_err(transport_error)?;
        self.listener = Some(listener);
        Ok(local)
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr, connections: &Connections) {
        self.next_conn += 1;
        let conn = self.next_conn;
        let (tx, rx) = mpsc::unbounded_channel();
        connections.lock().insert(conn, tx);

        let (read, write) = stream.into_split();
        let dispatcher = self
            .dispatcher
            .with_prefix(tcp_address().child(conn.to_string()));
        let connections = connections.clone();
        tokio::spawn(async move {
            tracing::debug!(conn, peer = %peer, "control connection opened");
            let writer = tokio::spawn(write_loop(write, rx));
            read_loop(read, &dispatcher, conn).await;
            connections.lock().remove(&conn);
            let _ = writer.await;
            tracing::debug!(conn, "control connection closed");
        });
    }

    fn route_reply(&self, envelope: Envelope, connections: &Connections) {
        let rest = self.mailbox.rest_of(&envelope);
        let Some(conn) = rest.segments().first().and_then(|s| s.parse::<u64>().ok()) else {
            tracing::debug!(to = %envelope.to, "reply without a connection id");
            return;
        };
        let outbound = Envelope {
            to: rest.strip(1),
            ..envelope
        };
        let bytes = match encode_envelope(&outbound) {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                bytes
            }
            Err(e) => {
                tracing::warn!(conn, error = %e, "dropping reply");
                return;
            }
        };
        let sent = connections
            .lock()
            .get(&conn)
            .map(|tx| tx.send(bytes).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::debug!(conn, "reply for a closed connection");
        }
    }
}

async fn read_loop(read: OwnedReadHalf, dispatcher: &Dispatcher, conn: u64) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(conn, error = %e, "control read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_envelope(line.as_bytes()) {
            Ok(envelope) => {
                if let Err(e) = dispatcher.dispatch(envelope, false) {
                    tracing::warn!(conn, error = %e, "control envelope not delivered");
                }
            }
            Err(e) => tracing::warn!(conn, error = %e, "dropping malformed control line"),
        }
    }
}

async fn write_loop(mut write: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = rx.recv().await {
        if write.write_all(&bytes).await.is_err() {
            return;
        }
    }
    let _ = write.shutdown().await;
}

#[async_trait]
impl Worker for TcpControlListener {
    fn name(&self) -> String {
        "tcp-control".to_string()
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let local = self.bind().await?;
        let Some(listener) = self.listener.take() else {
            return Err(HiveError::TransportError("control listener missing".into()));
        };
        tracing::info!(local = %local, "TCP control listener ready");

        let connections: Connections = Arc::default();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept(stream, peer, &connections),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                envelope = self.mailbox.next() => {
                    self.route_reply(envelope?, &connections);
                }
            }
        }
    }
}

/// Client side of the control connection
pub struct ControlClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl ControlClient {
    pub async fn connect(addr: SocketAddr) -> HiveResult<Self> {
        let stream = TcpStream::connect(addr).await.map_err(transport_error)?;
        let (read, write) = stream.into_split();
        Ok(ControlClient {
            lines: BufReader::new(read).lines(),
            write,
        })
    }

    pub async fn send(&mut self, envelope: &Envelope) -> HiveResult<()> {
        let mut bytes = encode_envelope(envelope)?;
        bytes.push(b'\n');
        self.write.write_all(&bytes).await.map_err(transport_error)
    }

    /// Next envelope from the node, `None` once the connection closes
    pub async fn next(&mut self, timeout: Duration) -> HiveResult<Option<Envelope>> {
        loop {
            let line = tokio::time::timeout(timeout, self.lines.next_line())
                .await
                .map_err(|_| HiveError::Timeout(timeout))?
                .map_err(transport_error)?;
            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return decode_envelope(line.as_bytes()).map(Some),
            }
        }
    }

    /// Send `message` to `to` and collect replies up to the first Pong
    pub async fn request(
        &mut self,
        to: Address,
        message: Message,
        timeout: Duration,
    ) -> HiveResult<Vec<Message>> {
        self.send(&Envelope::new(Address::root(), to, message)).await?;
        let mut replies = Vec::new();
        while let Some(envelope) = self.next(timeout).await? {
            if envelope.contents == Message::Pong {
                return Ok(replies);
            }
            replies.push(envelope.contents);
        }
        Err(HiveError::TransportError("connection closed before Pong".into()))
    }
}
