//! Tokio-based asynchronous transport.
//!
//! Wraps a single long-lived `tokio::net::UdpSocket` inside a dedicated
//! multi-thread runtime. Unlike the raw-socket transport, the same socket is
//! reused across broadcast rounds and reply reception (§9's "shared mutable
//! endpoint state" note) — there's no per-round socket churn.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;

use crate::error::ClockError;
use crate::transport::{Received, Transport, MULTICAST_ADDR, MULTICAST_TTL};

pub struct TokioTransport {
    rt: Runtime,
    socket: UdpSocket,
}

impl TokioTransport {
    /// Binds the client-role listener: joins the multicast group on `port`.
    pub fn bind_client_listener(port: u16, interface: Option<Ipv4Addr>) -> Result<Self, ClockError> {
        let rt = Runtime::new().map_err(ClockError::Socket)?;
        let std_socket = new_reusable_std_socket(port)?;
        let socket = rt
            .block_on(async { UdpSocket::from_std(std_socket) })
            .map_err(ClockError::Socket)?;

        let mcast_addr: Ipv4Addr = MULTICAST_ADDR.parse().map_err(ClockError::AddrParse)?;
        let iface = interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(mcast_addr, iface).map_err(ClockError::MulticastJoin)?;

        Ok(Self { rt, socket })
    }

    /// Binds the server-role endpoint: one socket shared by every broadcast
    /// round and by reply reception, with outbound multicast options set once.
    pub fn bind_server(local_port: u16) -> Result<Self, ClockError> {
        let rt = Runtime::new().map_err(ClockError::Socket)?;
        let std_socket = new_reusable_std_socket(local_port)?;
        let socket = rt
            .block_on(async { UdpSocket::from_std(std_socket) })
            .map_err(ClockError::Socket)?;

        // tokio's UdpSocket doesn't expose IP_MULTICAST_IF; the outbound interface
        // is left to routing. Loopback, TTL, and broadcast are still ours to set.
        socket.set_multicast_loop_v4(true).map_err(ClockError::Socket)?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL).map_err(ClockError::Socket)?;
        socket.set_broadcast(true).map_err(ClockError::Socket)?;

        Ok(Self { rt, socket })
    }
}

fn new_reusable_std_socket(port: u16) -> Result<std::net::UdpSocket, ClockError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(ClockError::Socket)?;
    socket.set_reuse_address(true).map_err(ClockError::Socket)?;
    socket.set_nonblocking(true).map_err(ClockError::Socket)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into()).map_err(ClockError::Socket)?;
    Ok(socket.into())
}

impl Transport for TokioTransport {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> Result<(), ClockError> {
        self.rt
            .block_on(async { self.socket.send_to(payload, dest).await })
            .map_err(ClockError::Socket)?;
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Received>, ClockError> {
        let mut buf = vec![0u8; crate::wire::RECORD_SIZE + 64];
        let result = self.rt.block_on(async {
            tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await
        });
        match result {
            Ok(Ok((n, from))) => Ok(Some(Received { bytes: buf[..n].to_vec(), from })),
            Ok(Err(e)) => Err(ClockError::Socket(e)),
            Err(_elapsed) => Ok(None),
        }
    }

    fn recv(&self) -> Result<Received, ClockError> {
        let mut buf = vec![0u8; crate::wire::RECORD_SIZE + 64];
        let (n, from) = self
            .rt
            .block_on(async { self.socket.recv_from(&mut buf).await })
            .map_err(ClockError::Socket)?;
        Ok(Received { bytes: buf[..n].to_vec(), from })
    }
}
