//! UDP transport for DHCP client traffic.
//!
//! [`DhcpClient`] owns one socket and comes in two modes: a listening client
//! bound to the DHCP client port, and a send-only client that can broadcast
//! but never receives. The discovery session only talks to the
//! [`Transport`] trait so tests can script replies.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::packet::DhcpPacket;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 1500;

/// What the discovery session needs from a transport.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Serializes `packet` and sends it to the DHCP servers.
    async fn broadcast(&mut self, packet: &DhcpPacket) -> Result<()>;

    /// Waits up to `timeout` for one datagram and parses it.
    ///
    /// Returns [`Error::Timeout`] when nothing arrived in time and
    /// [`Error::InvalidPacket`] when the datagram did not parse.
    async fn receive(&mut self, timeout: Duration) -> Result<(DhcpPacket, SocketAddr)>;

    /// Whether [`receive`](Self::receive) is supported.
    fn is_listening(&self) -> bool;

    /// Releases the underlying resources. Safe to call more than once.
    fn close(&mut self);
}

impl<T: Transport> Transport for &mut T {
    async fn broadcast(&mut self, packet: &DhcpPacket) -> Result<()> {
        (**self).broadcast(packet).await
    }

    async fn receive(&mut self, timeout: Duration) -> Result<(DhcpPacket, SocketAddr)> {
        (**self).receive(timeout).await
    }

    fn is_listening(&self) -> bool {
        (**self).is_listening()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Bound to the client port, can broadcast and receive.
    Listening,
    /// Bound to an ephemeral port, broadcast only.
    SendOnly,
}

#[derive(Debug)]
pub struct DhcpClient {
    socket: Option<UdpSocket>,
    mode: ClientMode,
    destination: SocketAddr,
}

impl DhcpClient {
    /// Opens a listening client on `0.0.0.0:68`.
    ///
    /// Binding port 68 usually needs elevated privileges and fails while
    /// the system DHCP client holds it.
    pub fn new(interface: Option<&str>) -> Result<Self> {
        Self::bind(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_CLIENT_PORT),
            broadcast_destination(),
            ClientMode::Listening,
            interface,
        )
    }

    /// Opens a send-only client on an ephemeral port.
    pub fn new_not_listening(interface: Option<&str>) -> Result<Self> {
        Self::bind(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            broadcast_destination(),
            ClientMode::SendOnly,
            interface,
        )
    }

    /// Opens a client on explicit addresses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        local: SocketAddrV4,
        destination: SocketAddr,
        mode: ClientMode,
        interface: Option<&str>,
    ) -> Result<Self> {
        let socket = create_socket(local, interface)?;
        debug!("DHCP client bound to {} ({:?})", local, mode);

        Ok(Self {
            socket: Some(socket),
            mode,
            destination,
        })
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    /// Address the socket is bound to, `None` once closed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()?.local_addr().ok()
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::Socket("Socket already closed".to_string()))
    }
}

impl Transport for DhcpClient {
    async fn broadcast(&mut self, packet: &DhcpPacket) -> Result<()> {
        let encoded = packet.serialize()?;
        let socket = self.socket()?;

        socket
            .send_to(&encoded, self.destination)
            .await
            .map_err(|error| {
                Error::Send(format!("Failed to send to {}: {}", self.destination, error))
            })?;

        debug!(
            "Sent {} bytes (xid {:#010x}) to {}",
            encoded.len(),
            packet.xid,
            self.destination
        );
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<(DhcpPacket, SocketAddr)> {
        if self.mode == ClientMode::SendOnly {
            return Err(Error::NotListening);
        }
        let socket = self.socket()?;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        let (size, source) = tokio::time::timeout(timeout, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        debug!("Received {} bytes from {}", size, source);
        let packet = DhcpPacket::parse(&buffer[..size])?;
        Ok((packet, source))
    }

    fn is_listening(&self) -> bool {
        self.mode == ClientMode::Listening && self.socket.is_some()
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("DHCP client socket closed");
        }
    }
}

fn broadcast_destination() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_SERVER_PORT))
}

fn create_socket(bind_addr: SocketAddrV4, interface: Option<&str>) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

    if let Some(interface) = interface {
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
        {
            if let Err(error) = socket.bind_device(Some(interface.as_bytes())) {
                warn!("Failed to bind to interface {}: {}", interface, error);
            }
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
        {
            warn!(
                "Binding to interface {} is only supported on Linux and will be ignored",
                interface
            );
        }
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|error| Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
        .map_err(|error| Error::Socket(format!("Failed to convert to tokio socket: {}", error)))
}
