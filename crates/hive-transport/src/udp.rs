//! UDP broadcast transport
//!
//! One broadcaster / listener pair per configured interface. The
//! broadcaster owns the mailbox `/udp/<name>` and sends everything it
//! receives to the interface's broadcast address; the listener decodes
//! datagrams on that port and hands them to the local dispatcher with the
//! sender rewritten to `/udp/<name>/...`.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use hive_core::{Address, BucketPath, Envelope, HiveError, HiveResult, Message};
use hive_dispatch::{Dispatcher, Mailbox, Worker, WorkerExit};
use hive_wire::{decode_envelope, encode_datagram, MAX_DATAGRAM_SIZE};

use crate::Advertiser;

/// Delay between listener bind attempts
const BIND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// One broadcast interface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    /// Segment used in `/udp/<name>`
    pub name: String,
    /// Local address the listener binds
    pub bind: IpAddr,
    /// Where the broadcaster sends
    pub broadcast: IpAddr,
    pub port: u16,
    /// First port tried for the send socket (0 = any)
    pub send_port: u16,
    /// Bind attempts before giving up
    pub port_attempts: u16,
}

impl Default for UdpSettings {
    fn default() -> Self {
        UdpSettings {
            name: "lan".to_string(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast: IpAddr::V4(Ipv4Addr::BROADCAST),
            port: 4880,
            send_port: 0,
            port_attempts: 10,
        }
    }
}

impl UdpSettings {
    /// `/udp/<name>`
    pub fn address(&self) -> Address {
        Address::from_segments(["udp", self.name.as_str()])
    }

    pub fn broadcast_addr(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast, self.port)
    }
}

/// Hand an inbound envelope to the local dispatcher.
///
/// Our own traffic echoed back by the network is dropped, and so is
/// anything no local mailbox wants (broadcasts reach every node).
pub fn deliver_inbound(dispatcher: &Dispatcher, envelope: Envelope, transport: &str) -> bool {
    if envelope.from.starts_with(&dispatcher.node_address()) {
        return false;
    }
    match dispatcher.dispatch(envelope, false) {
        Ok(_) => true,
        Err(HiveError::NoRoute(to)) => {
            tracing::trace!(transport, to = %to, "no local route");
            false
        }
        Err(e) => {
            tracing::warn!(transport, error = %e, "inbound dispatch failed");
            false
        }
    }
}

/// Bind a socket, moving to the next port while the current one is taken
pub async fn bind_probing(ip: IpAddr, first_port: u16, attempts: u16) -> HiveResult<UdpSocket> {
    if first_port == 0 {
        return UdpSocket::bind(SocketAddr::new(ip, 0))
            .await
            .map_err(|e| HiveError::TransportError(e.to_string()));
    }
    for offset in 0..attempts.max(1) {
        let Some(port) = first_port.checked_add(offset) else {
            break;
        };
        match UdpSocket::bind(SocketAddr::new(ip, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                tracing::debug!(port, "port in use, probing next");
            }
            Err(e) => return Err(HiveError::TransportError(e.to_string())),
        }
    }
    Err(HiveError::AddressInUse(format!(
        "{ip}: ports {first_port}..+{attempts}"
    )))
}

/// Sends everything in `/udp/<name>` to the broadcast address
pub struct UdpBroadcaster {
    settings: UdpSettings,
    mailbox: Mailbox,
    dispatcher: Dispatcher,
    advertiser: Advertiser,
}

impl UdpBroadcaster {
    pub fn new(
        settings: UdpSettings,
        mailbox: Mailbox,
        dispatcher: Dispatcher,
        advertiser: Advertiser,
    ) -> Self {
        UdpBroadcaster {
            settings,
            mailbox,
            dispatcher,
            advertiser,
        }
    }

    fn advertise(&self) -> HiveResult<()> {
        self.advertiser
            .advertise(BucketPath::new(["networks"]), format!("udp/{}", self.settings.name))
    }

    async fn send(&self, socket: &UdpSocket, envelope: &Envelope) {
        let target = self.settings.broadcast_addr();
        let bytes = match encode_datagram(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(to = %envelope.to, error = %e, "dropping outbound envelope");
                return;
            }
        };
        if let Err(e) = socket.send_to(&bytes, target).await {
            tracing::warn!(target = %target, error = %e, "UDP send failed");
        }
    }
}

#[async_trait]
impl Worker for UdpBroadcaster {
    fn name(&self) -> String {
        format!("udp-broadcaster/{}", self.settings.name)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        self.advertise()?;
        let mut readvertise = self.advertiser.schedule();

        let socket = bind_probing(
            self.settings.bind,
            self.settings.send_port,
            self.settings.port_attempts,
        )
        .await?;
        socket
            .set_broadcast(true)
            .map_err(|e| HiveError::TransportError(e.to_string()))?;
        tracing::info!(
            interface = %self.settings.name,
            local = ?socket.local_addr().ok(),
            target = %self.settings.broadcast_addr(),
            "UDP broadcaster ready"
        );

        let bootstrap = Envelope::new(
            self.dispatcher.brain_address(),
            Address::any_brain(),
            Message::Request {
                patterns: vec!["**".to_string()],
            },
        );
        self.send(&socket, &bootstrap).await;

        loop {
            let envelope = self.mailbox.next().await?;
            let outbound = Envelope {
                to: self.mailbox.rest_of(&envelope),
                ..envelope
            };
            self.send(&socket, &outbound).await;

            if readvertise.its_time() {
                self.advertise()?;
            }
        }
    }
}

/// Receives broadcast datagrams for one interface
pub struct UdpListener {
    settings: UdpSettings,
    dispatcher: Dispatcher,
    advertiser: Advertiser,
    socket: Option<UdpSocket>,
}

impl UdpListener {
    /// `dispatcher` is the root handle; the listener adds its own prefix
    pub fn new(settings: UdpSettings, dispatcher: &Dispatcher, advertiser: Advertiser) -> Self {
        UdpListener {
            dispatcher: dispatcher.with_prefix(settings.address()),
            settings,
            advertiser,
            socket: None,
        }
    }

    /// Bind the receive socket, retrying while the port is busy
    pub async fn bind(&mut self) -> HiveResult<SocketAddr> {
        if let Some(socket) = &self.socket {
            return socket
                .local_addr()
                .map_err(|e| HiveError::TransportError(e.to_string()));
        }
        let addr = SocketAddr::new(self.settings.bind, self.settings.port);
        let mut attempt = 0;
        let socket = loop {
            match UdpSocket::bind(addr).await {
                Ok(socket) => break socket,
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    attempt += 1;
                    if attempt >= self.settings.port_attempts.max(1) {
                        return Err(HiveError::AddressInUse(addr.to_string()));
                    }
                    tracing::debug!(addr = %addr, attempt, "listen port busy, retrying");
                    tokio::time::sleep(BIND_RETRY_DELAY * u32::from(attempt)).await;
                }
                Err(e) => return Err(HiveError::TransportError(e.to_string())),
            }
        };
        let local = socket
            .local_addr()
            .map_err(|e| HiveError::TransportError(e.to_string()))?;
        self.socket = Some(socket);
        Ok(local)
    }

    fn advertise(&self, local: SocketAddr) -> HiveResult<()> {
        self.advertiser
            .advertise(self.advertiser.own_bucket("addresses"), format!("udp://{local}"))
    }

    fn handle_datagram(&self, bytes: &[u8], source: SocketAddr) {
        match decode_envelope(bytes) {
            Ok(envelope) => {
                deliver_inbound(&self.dispatcher, envelope, "udp");
            }
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "dropping malformed datagram");
            }
        }
    }
}

#[async_trait]
impl Worker for UdpListener {
    fn name(&self) -> String {
        format!("udp-listener/{}", self.settings.name)
    }

    async fn run(&mut self) -> HiveResult<WorkerExit> {
        let local = self.bind().await?;
        self.advertise(local)?;
        let mut readvertise = self.advertiser.schedule();
        tracing::info!(interface = %self.settings.name, local = %local, "UDP listener ready");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let due = tokio::time::Instant::from_std(readvertise.next_due());
            let Some(socket) = self.socket.as_ref() else {
                return Err(HiveError::TransportError("listener socket missing".into()));
            };
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                    Err(e) => tracing::warn!(error = %e, "UDP receive error"),
                },
                _ = tokio::time::sleep_until(due) => {
                    if readvertise.its_time() {
                        self.advertise(local)?;
                    }
                }
            }
        }
    }
}
