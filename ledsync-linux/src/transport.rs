//! LAN transport: one UDP socket, broadcast + unicast, IPv4 addresses mapped onto 6-byte peer
//! addresses (4 address bytes, 2 port bytes big-endian).

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use ledsync_core::PeerAddress;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const MAX_DATAGRAM: usize = 1500;

pub fn peer_address(addr: SocketAddrV4) -> PeerAddress {
    let ip = addr.ip().octets();
    let port = addr.port().to_be_bytes();
    PeerAddress::from_bytes([ip[0], ip[1], ip[2], ip[3], port[0], port[1]])
}

/// Socket address for a peer address; the broadcast address maps to the LAN broadcast on `port`.
pub fn socket_address(addr: PeerAddress, port: u16) -> SocketAddrV4 {
    if addr.is_broadcast() {
        return SocketAddrV4::new(Ipv4Addr::BROADCAST, port);
    }
    let b = addr.as_bytes();
    SocketAddrV4::new(
        Ipv4Addr::new(b[0], b[1], b[2], b[3]),
        u16::from_be_bytes([b[4], b[5]]),
    )
}

pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
    local: PeerAddress,
}

impl UdpTransport {
    /// Bind the shared port with broadcast enabled. `local_ip` is what peers see as our source
    /// address; detected from the default route when not configured.
    pub async fn bind(port: u16, local_ip: Option<Ipv4Addr>) -> std::io::Result<Self> {
        let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        std_sock.set_broadcast(true)?;
        std_sock.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_sock)?;
        let ip = match local_ip {
            Some(ip) => ip,
            None => detect_local_ip().unwrap_or_else(|| {
                tracing::warn!("could not detect LAN address, self-filtering may fail");
                Ipv4Addr::LOCALHOST
            }),
        };
        Ok(Self {
            socket,
            port,
            local: peer_address(SocketAddrV4::new(ip, port)),
        })
    }

    pub fn local_address(&self) -> PeerAddress {
        self.local
    }

    /// Fire-and-forget send; failures are logged and dropped.
    pub async fn send(&self, to: PeerAddress, frame: &[u8]) {
        let dest = socket_address(to, self.port);
        if let Err(e) = self.socket.send_to(frame, dest).await {
            tracing::debug!(%dest, error = %e, "send failed");
        }
    }
}

/// Interface address of the default route. Connecting a UDP socket sends nothing.
fn detect_local_ip() -> Option<Ipv4Addr> {
    let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    probe.connect((Ipv4Addr::new(10, 255, 255, 255), 1)).ok()?;
    match probe.local_addr().ok()? {
        SocketAddr::V4(a) if !a.ip().is_unspecified() => Some(*a.ip()),
        _ => None,
    }
}

/// Forward every received datagram to the sync loop until the loop goes away.
pub async fn recv_loop(
    transport: Arc<UdpTransport>,
    tx: mpsc::UnboundedSender<(PeerAddress, Vec<u8>)>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match transport.socket.recv_from(&mut buf).await {
            Ok((n, SocketAddr::V4(from))) => {
                if tx.send((peer_address(from), buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Ok((_, from)) => tracing::trace!(%from, "ignoring non-IPv4 sender"),
            Err(e) => tracing::warn!(error = %e, "receive failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_mapping_roundtrip() {
        let sock = SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 20), 45680);
        let peer = peer_address(sock);
        assert_eq!(peer.as_bytes(), &[192, 168, 4, 20, 0xb2, 0x70]);
        assert_eq!(socket_address(peer, 1), sock);
    }

    #[test]
    fn broadcast_maps_to_lan_broadcast() {
        assert_eq!(
            socket_address(PeerAddress::BROADCAST, 45680),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 45680)
        );
    }

    #[tokio::test]
    async fn unicast_between_two_sockets() {
        let a = Arc::new(
            UdpTransport::bind(0, Some(Ipv4Addr::LOCALHOST))
                .await
                .unwrap(),
        );
        let b_std = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let b_addr = match b_std.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        b_std.set_nonblocking(true).unwrap();
        let b = UdpSocket::from_std(b_std).unwrap();

        a.send(peer_address(b_addr), b"\xa5\x01ping").await;
        let mut buf = [0u8; 16];
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\xa5\x01ping");
    }
}
